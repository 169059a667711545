use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam::channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use picture_pipeline::analysis::palette::PaletteAnalyzer;
use picture_pipeline::analysis::service::SidecarAnalyzer;
use picture_pipeline::analysis::AnalysisService;
use picture_pipeline::database::{PictureRecord, RecordStore, SqliteRecordStore};
use picture_pipeline::pipeline::{TriggerEvent, TriggerKind};
use picture_pipeline::storage::{FsObjectStore, ObjectRef, ObjectStore};
use picture_pipeline::utils::config::{self, Settings};
use picture_pipeline::{response_status, Pipeline, PipelineError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file, `KEY=VALUE` per line
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Analyze by color palette when no annotations are configured. The
    /// palette carries no safety signal, so every picture is admitted.
    #[arg(long)]
    palette_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the resolved settings to the settings file
    Init,
    /// Analyze an uploaded object and record it if it passes the safety gate
    Analyze { bucket: String, name: String },
    /// Derive the thumbnail of an object
    Thumbnail { bucket: String, name: String },
    /// Compose the collage from the newest pictures
    Collage,
    /// Derive the thumbnail of an object, then try the collage
    Process { bucket: String, name: String },
    /// Print the newest picture records and the total on record
    Recent {
        #[arg(short, long, default_value_t = 10)]
        count: usize,
    },
    /// Print the record of one picture
    Show { name: String },
    /// Print upload and process triggers for every object in a bucket
    Replay { bucket: String },
    /// Handle JSON-line triggers from a file (or `-` for stdin) on a worker pool
    Run {
        #[arg(short, long)]
        events: PathBuf,

        #[arg(short, long)]
        workers: Option<usize>,
    },
}

#[derive(Serialize)]
struct Listing {
    total: usize,
    pictures: Vec<PictureRecord>,
}

#[derive(Serialize)]
struct Response<T: Serialize> {
    status: u16,
    #[serde(flatten)]
    body: T,
}

/// Whether the palette analyzer may stand in for annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Palette {
    Refused,
    OptedIn,
    /// The command never analyzes uploads.
    Unused,
}

impl Palette {
    fn for_command(command: &Command, palette_only: bool) -> Self {
        match command {
            Command::Analyze { .. } | Command::Run { .. } if palette_only => Palette::OptedIn,
            Command::Analyze { .. } | Command::Run { .. } => Palette::Refused,
            _ => Palette::Unused,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let settings = config::load(&args.env_file)?;
    let palette = Palette::for_command(&args.command, args.palette_only);

    match args.command {
        Command::Init => {
            config::save_to_env(&args.env_file, &settings)?;
            info!("Saved settings to {:?}", args.env_file);
        }
        Command::Analyze { bucket, name } => {
            let pipeline = build_pipeline(&settings, palette)?;
            report(pipeline.handle_upload(&ObjectRef::new(bucket, name)))?;
        }
        Command::Thumbnail { bucket, name } => {
            let pipeline = build_pipeline(&settings, palette)?;
            report(pipeline.derive_thumbnail(&ObjectRef::new(bucket, name)))?;
        }
        Command::Collage => {
            let pipeline = build_pipeline(&settings, palette)?;
            report(pipeline.compose_collage())?;
        }
        Command::Process { bucket, name } => {
            let pipeline = build_pipeline(&settings, palette)?;
            report(pipeline.handle_processing(&ObjectRef::new(bucket, name)))?;
        }
        Command::Recent { count } => {
            let records = open_records(&settings)?;
            println!("{}", serde_json::to_string(&listing(&records, count)?)?);
        }
        Command::Show { name } => {
            let records = open_records(&settings)?;
            println!("{}", serde_json::to_string(&show(&records, &name)?)?);
        }
        Command::Replay { bucket } => {
            let store = FsObjectStore::new(&settings.data_dir);
            for name in store.list(&bucket)? {
                let object = ObjectRef::new(bucket.clone(), name);
                for trigger in [TriggerKind::Upload, TriggerKind::Process] {
                    let event = TriggerEvent::new(trigger, object.clone());
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
        }
        Command::Run { events, workers } => {
            let pipeline = Arc::new(build_pipeline(&settings, palette)?);
            run(pipeline, &events, workers.unwrap_or(settings.workers))?;
        }
    }
    Ok(())
}

fn open_records(settings: &Settings) -> Result<SqliteRecordStore> {
    if let Some(parent) = settings.db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    SqliteRecordStore::open(&settings.db_path)
        .with_context(|| format!("Failed to open record store {:?}", settings.db_path))
}

fn build_pipeline(settings: &Settings, palette: Palette) -> Result<Pipeline> {
    fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("Failed to create data dir {:?}", settings.data_dir))?;
    let store = Arc::new(FsObjectStore::new(&settings.data_dir));
    let records = Arc::new(open_records(settings)?);

    let analyzer = choose_analyzer(settings.analysis_dir.as_deref(), palette, store.clone())?;

    Ok(Pipeline::new(
        analyzer,
        records,
        store.clone(),
        store,
        settings.bucket_thumbnails.clone(),
        settings.work_dir.clone(),
    ))
}

fn choose_analyzer(
    analysis_dir: Option<&Path>,
    palette: Palette,
    store: Arc<FsObjectStore>,
) -> Result<Arc<dyn AnalysisService>> {
    match (analysis_dir, palette) {
        (Some(dir), _) => {
            info!("Reading annotations from {:?}", dir);
            Ok(Arc::new(SidecarAnalyzer::new(dir)))
        }
        (None, Palette::Unused) => Ok(Arc::new(PaletteAnalyzer::new(store))),
        (None, Palette::OptedIn) => {
            warn!("No {} set, using the palette analyzer which admits every picture", config::ANALYSIS_DIR);
            Ok(Arc::new(PaletteAnalyzer::new(store)))
        }
        (None, Palette::Refused) => Err(anyhow!(
            "{} is not set; set it or pass --palette-only to admit pictures unscreened",
            config::ANALYSIS_DIR
        )),
    }
}

fn listing(records: &dyn RecordStore, count: usize) -> Result<Listing> {
    Ok(Listing { total: records.count()?, pictures: records.most_recent(count)? })
}

fn show(records: &dyn RecordStore, name: &str) -> Result<PictureRecord> {
    records
        .get(name)?
        .ok_or_else(|| anyhow!("No picture record named '{name}'"))
}

/// Print the outcome with its transport status, or fail with it.
fn report<T: Serialize>(result: Result<T, PipelineError>) -> Result<()> {
    let status = response_status(&result);
    match result {
        Ok(body) => {
            println!("{}", serde_json::to_string(&Response { status, body })?);
            Ok(())
        }
        Err(e) => Err(anyhow!(e).context(format!("Trigger failed with status {status}"))),
    }
}

fn open_events(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Failed to open events {:?}", path))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Worker index for an object. Records are keyed by name, so the name alone
/// decides.
fn shard_for(object: &ObjectRef, workers: usize) -> usize {
    let digest = Sha256::digest(object.name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % workers as u64) as usize
}

#[derive(Default)]
struct Tally {
    ok: u64,
    client_errors: u64,
    server_errors: u64,
}

impl Tally {
    fn add(&mut self, status: u16) {
        match status {
            400..=499 => self.client_errors += 1,
            500..=u16::MAX => self.server_errors += 1,
            _ => self.ok += 1,
        }
    }
}

fn run(pipeline: Arc<Pipeline>, events: &Path, num_workers: usize) -> Result<()> {
    let reader = open_events(events)?;
    info!("Handling triggers from {:?} with {} workers", events, num_workers);

    let num_workers = num_workers.max(1);
    let (status_tx, status_rx) = bounded::<u16>(1024);

    // One queue per worker; all triggers for an object go to the same one so
    // its upload is handled before its processing request.
    let (event_txs, event_rxs): (Vec<_>, Vec<_>) =
        (0..num_workers).map(|_| bounded::<TriggerEvent>(1024)).unzip();

    // 1. Reader thread
    let reader_status_tx = status_tx.clone();
    let reader_handle = thread::spawn(move || {
        for (index, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to read events: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match TriggerEvent::parse(line.as_bytes()) {
                Ok(event) => {
                    let shard = shard_for(&event.object, event_txs.len());
                    if event_txs[shard].send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(line = index + 1, "Skipping event: {}", e);
                    let _ = reader_status_tx.send(e.status());
                }
            }
        }
    });

    // 2. Worker threads
    let mut worker_handles = Vec::new();
    for (i, rx) in event_rxs.into_iter().enumerate() {
        let tx = status_tx.clone();
        let pipeline = Arc::clone(&pipeline);
        worker_handles.push(thread::spawn(move || {
            info!("Worker {} started", i);
            for event in rx {
                let result = pipeline.dispatch(&event);
                let status = response_status(&result);
                match result {
                    Ok(handled) => info!(object = %event.object, stage = ?handled.stage(), status, "Trigger handled"),
                    Err(e) => {
                        let retryable = e.is_retryable();
                        error!(object = %event.object, status, retryable, "Trigger failed: {:#}", anyhow!(e));
                    }
                }
                let _ = tx.send(status);
            }
            info!("Worker {} finished", i);
        }));
    }
    drop(status_tx);

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::with_template("{spinner} {pos} triggers {msg}")?);
    let mut tally = Tally::default();
    for status in status_rx {
        tally.add(status);
        progress.inc(1);
        progress.set_message(format!("({} failed)", tally.client_errors + tally.server_errors));
    }
    progress.finish();

    reader_handle
        .join()
        .map_err(|_| anyhow!("event reader panicked"))?;
    for handle in worker_handles {
        handle.join().map_err(|_| anyhow!("worker panicked"))?;
    }

    info!(
        ok = tally.ok,
        client_errors = tally.client_errors,
        server_errors = tally.server_errors,
        "Run completed"
    );
    if tally.server_errors > 0 {
        return Err(anyhow!("{} triggers failed and should be redelivered", tally.server_errors));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use picture_pipeline::database::CreateOutcome;

    fn analyze_command() -> Command {
        Command::Analyze { bucket: "uploads".to_string(), name: "a.png".to_string() }
    }

    #[test]
    fn test_screening_commands_need_annotations_or_opt_in() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(FsObjectStore::new(dir.path()));

        let refused = Palette::for_command(&analyze_command(), false);
        assert_eq!(refused, Palette::Refused);
        assert!(choose_analyzer(None, refused, store.clone()).is_err());

        let opted_in = Palette::for_command(&analyze_command(), true);
        assert_eq!(opted_in, Palette::OptedIn);
        assert!(choose_analyzer(None, opted_in, store.clone()).is_ok());

        assert!(choose_analyzer(Some(dir.path()), refused, store.clone()).is_ok());
        assert_eq!(Palette::for_command(&Command::Collage, false), Palette::Unused);
        assert!(choose_analyzer(None, Palette::Unused, store).is_ok());
        Ok(())
    }

    #[test]
    fn test_listing_reports_total_and_show_finds_one() -> Result<()> {
        let records = SqliteRecordStore::in_memory()?;
        for name in ["a.png", "b.png", "c.png"] {
            assert!(matches!(
                records.create_if_absent(name, &["Thing".to_string()], "#010203")?,
                CreateOutcome::Created(_)
            ));
        }

        let listed = listing(&records, 2)?;
        assert_eq!(listed.total, 3);
        let names: Vec<_> = listed.pictures.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c.png", "b.png"]);

        let record = show(&records, "a.png")?;
        assert_eq!(record.labels, vec!["Thing"]);
        assert_eq!(record.color, "#010203");
        assert!(show(&records, "missing.png").is_err());
        Ok(())
    }

    #[test]
    fn test_shard_depends_on_name_only() {
        let upload = ObjectRef::new("uploads", "cat.png");
        let elsewhere = ObjectRef::new("other", "cat.png");
        for workers in 1..8 {
            let shard = shard_for(&upload, workers);
            assert!(shard < workers);
            assert_eq!(shard, shard_for(&elsewhere, workers));
        }
    }
}
