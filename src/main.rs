use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tabscan::config::cli::Command;
use tabscan::utils::logger;
use tabscan::{
    CliConfig, FileMetadataStore, FileQuery, Framing, LocalByteStore, ScanError, Upload,
    UploadOrchestrator, UploadState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting tabscan CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.scan_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(2);
        }
    };

    let bytes = Arc::new(LocalByteStore::new(config.upload_dir.clone()));
    tracing::debug!("Upload folder: {}", bytes.base_path().display());
    let metadata_path = CliConfig::metadata_path(&config);
    let metadata = Arc::new(
        FileMetadataStore::open(&metadata_path)
            .await
            .with_context(|| format!("opening metadata catalog {}", metadata_path.display()))?,
    );
    let orchestrator = UploadOrchestrator::new(bytes, metadata, config);

    match cli.command {
        Command::Upload { file, name, sse } => {
            let upload = Upload::from_path(&file, name)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let framing = if sse { Framing::Sse } else { Framing::Ndjson };

            let mut stdout = tokio::io::stdout();
            let state = orchestrator
                .upload_stream(upload)
                .write_frames(&mut stdout, framing)
                .await?;

            if state != UploadState::Completed {
                std::process::exit(1);
            }
        }
        Command::Report { reference } => {
            match orchestrator.report_by_reference(&reference).await {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(e) => exit_with("Report lookup", &e),
            }
        }
        Command::List {
            page,
            limit,
            search,
        } => {
            let query = FileQuery {
                page,
                limit,
                search,
            };
            match orchestrator.list_files(&query).await {
                Ok(listing) => println!("{}", serde_json::to_string_pretty(&listing)?),
                Err(e) => exit_with("File listing", &e),
            }
        }
        Command::Delete { reference } => match orchestrator.delete_file(&reference).await {
            Ok(record) => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "message": "File deleted successfully",
                    "file_id": record.id,
                    "original_filename": record.original_filename,
                    "stored_filename": record.stored_filename,
                }))?
            ),
            Err(e) => exit_with("File deletion", &e),
        },
    }

    Ok(())
}

fn exit_with(action: &str, e: &ScanError) -> ! {
    tracing::error!("❌ {} failed: {} (Category: {:?})", action, e, e.category());
    eprintln!("❌ {}", e.user_friendly_message());
    std::process::exit(1);
}
