use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use rangepull::{
    utils, DownloadError, DownloadListener, DownloadSession, JsonFileStore, Outcome,
    TransferRecord,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to download
    url: String,

    /// Directory to save the downloaded file
    #[arg(short = 'o', long = "out", default_value = "downloads")]
    out_dir: PathBuf,

    /// Directory holding transfer checkpoints
    #[arg(short = 's', long = "state", default_value = ".rangepull")]
    state_dir: PathBuf,

    /// Checkpoint key (defaults to a name derived from the URL)
    #[arg(short = 'k', long)]
    key: Option<String>,
}

struct BarListener {
    pb: ProgressBar,
}

impl DownloadListener for BarListener {
    fn on_progress(&self, s: &TransferRecord) {
        if s.total_size > 0 {
            self.pb.set_length(s.total_size as u64);
        }
        self.pb.set_position(s.download_position.max(0) as u64);
    }

    fn on_complete(&self, s: &TransferRecord) {
        self.pb.finish_with_message(format!(
            "Completed   {} ({})",
            s.save_path.display(),
            HumanBytes(s.download_position.max(0) as u64)
        ));
    }

    fn on_cancelled(&self, s: &TransferRecord) {
        self.pb.abandon_with_message(format!(
            "Paused at {} (rerun to resume)",
            HumanBytes(s.download_position.max(0) as u64)
        ));
    }

    fn on_error(&self, error: &DownloadError) {
        self.pb.abandon_with_message(format!("Failed: {}", error));
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let filename = utils::get_filename_from_url(&args.url)?;
    let filename = utils::sanitize_filename(&filename);
    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .context("Failed to create output directory")?;
    let save_path = args.out_dir.join(&filename);

    let key = args.key.clone().unwrap_or_else(|| utils::derive_key(&args.url));
    let record = TransferRecord::new(key, args.url.clone(), save_path);

    let store = Arc::new(JsonFileStore::new(&args.state_dir));
    let session = Arc::new(DownloadSession::new(store));

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {eta:>4} {msg}")
        .unwrap()
        .progress_chars("=>-"));
    pb.set_message(format!("Downloading {}", filename));
    let listener = Arc::new(BarListener { pb });

    let handle = session.start(record, listener)?;

    // Ctrl-C pauses the transfer; the next run resumes from the checkpoint.
    let canceller = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.exit();
        }
    });

    match handle.join().await {
        Outcome::Completed(_) | Outcome::Cancelled(_) => Ok(()),
        Outcome::Failed(e) => bail!("Failed to download {}: {}", args.url, e),
    }
}
