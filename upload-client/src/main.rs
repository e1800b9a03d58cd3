use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use upload_client::{
    CandidateFile, HttpCredentialIssuer, HttpTransferExecutor, UploadOutcome, UploadPolicy,
    UploadSession,
};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "upload")]
#[command(about = "Upload a file directly to storage through a presigned URL")]
struct Args {
    /// File to upload
    file: PathBuf,

    /// Base URL of the credential issuer
    #[arg(long, env = "ISSUER_URL", default_value = "http://localhost:9090")]
    issuer_url: Url,

    /// MIME type sent as Content-Type (guessed from the extension if omitted)
    #[arg(long, value_name = "MIME")]
    content_type: Option<String>,

    /// Validate against the limits advertised by the issuer instead of the defaults
    #[arg(long)]
    use_server_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let issuer = HttpCredentialIssuer::new(args.issuer_url.clone())
        .context("Failed to create the issuer client")?;

    let policy = if args.use_server_config {
        let config = issuer
            .fetch_upload_config()
            .await
            .context("Failed to fetch upload configuration")?;
        UploadPolicy::from(config)
    } else {
        UploadPolicy::default()
    };
    let issuer = issuer.with_credential_ttl(policy.credential_ttl());

    let executor = HttpTransferExecutor::new().context("Failed to create the transfer client")?;
    let mut session = UploadSession::new(Arc::new(issuer), Arc::new(executor), policy);

    let content_type = args
        .content_type
        .unwrap_or_else(|| CandidateFile::guess_mime_type(&args.file).to_string());
    let file = CandidateFile::from_path(&args.file, content_type)
        .await
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    session.issue_credential().await?;
    session.select(file)?;
    session.start().await?;

    while let Some(event) = session.next_event().await {
        if session.apply(event) {
            if let UploadOutcome::InProgress { percent, .. } = session.outcome() {
                info!(percent, "Uploading");
            }
        }
        if session.outcome().is_terminal() {
            break;
        }
    }

    match session.outcome() {
        UploadOutcome::Succeeded { retrieval_url } => {
            info!(%retrieval_url, "Upload complete");
            println!("{retrieval_url}");
            Ok(())
        }
        UploadOutcome::Failed { reason } => bail!("Upload failed: {reason}"),
        other => bail!("Upload ended in unexpected state: {}", other.name()),
    }
}
