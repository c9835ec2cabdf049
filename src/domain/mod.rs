// Domain layer: core models and collaborator ports. No I/O lives here.

pub mod model;
pub mod ports;
