use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facelens_core::thumbnail::similarity;
use facelens_core::{EnrollmentStore, PixelDiffMatcher, SelectionPolicy, Thumbnail, ACCEPTANCE_THRESHOLD};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use zbus::proxy;

#[proxy(
    interface = "org.facelens.Analyzer1",
    default_service = "org.facelens.Analyzer1",
    default_path = "/org/facelens/Analyzer1"
)]
trait Analyzer {
    fn enroll(&self, label: &str, image_path: &str, detections_json: &str) -> zbus::Result<String>;
    fn analyze(&self, frame_path: &str, detections_json: &str) -> zbus::Result<String>;
    fn list_enrolled(&self) -> zbus::Result<String>;
    fn start_recognition(&self) -> zbus::Result<bool>;
    fn stop_recognition(&self) -> zbus::Result<bool>;
    fn latest_recognition(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facelens", about = "facelens face analysis CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face under a label
    Enroll {
        /// Name to report when this face is recognized
        #[arg(short, long)]
        label: String,
        /// Image containing the face
        #[arg(short, long)]
        image: PathBuf,
        /// Detector output JSON; without it the whole image is enrolled
        #[arg(short, long)]
        detections: Option<PathBuf>,
    },
    /// Analyze a frame against enrolled faces
    Analyze {
        #[arg(short, long)]
        frame: PathBuf,
        #[arg(short, long)]
        detections: PathBuf,
    },
    /// List enrolled faces
    List,
    /// Control recognition mode
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
    /// Show daemon status
    Status,
    /// Compare two face images directly (no daemon)
    Compare { a: PathBuf, b: PathBuf },
    /// Run the feature heuristics on a frame directly (no daemon)
    Inspect {
        #[arg(short, long)]
        frame: PathBuf,
        #[arg(short, long)]
        detections: PathBuf,
        #[arg(long, default_value_t = SelectionPolicy::First)]
        policy: SelectionPolicy,
        /// Seed the age jitter for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        /// Also print the probe crop as a data URL
        #[arg(long)]
        thumbnail: bool,
    },
}

#[derive(Subcommand)]
enum WatchAction {
    /// Start periodic recognition
    Start,
    /// Stop periodic recognition
    Stop,
    /// Print the most recent recognition result
    Latest,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare { a, b } => compare(&a, &b),
        Commands::Inspect {
            frame,
            detections,
            policy,
            seed,
            thumbnail,
        } => inspect(&frame, &detections, policy, seed, thumbnail),
        remote => call_daemon(remote).await,
    }
}

async fn call_daemon(command: Commands) -> Result<()> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    let proxy = AnalyzerProxy::new(&conn).await?;
    tracing::debug!(service = "org.facelens.Analyzer1", "connected to facelensd");

    match command {
        Commands::Enroll {
            label,
            image,
            detections,
        } => {
            let json = match detections {
                Some(path) => read_text(&path)?,
                None => String::new(),
            };
            let reply = proxy.enroll(&label, &absolute(&image)?, &json).await?;
            print_json(&reply);
        }
        Commands::Analyze { frame, detections } => {
            let json = read_text(&detections)?;
            let reply = proxy.analyze(&absolute(&frame)?, &json).await?;
            print_json(&reply);
        }
        Commands::List => print_json(&proxy.list_enrolled().await?),
        Commands::Watch { action } => match action {
            WatchAction::Start => {
                let started = proxy.start_recognition().await?;
                println!("{}", if started { "recognition started" } else { "recognition already running" });
            }
            WatchAction::Stop => {
                let stopped = proxy.stop_recognition().await?;
                println!("{}", if stopped { "recognition stopped" } else { "recognition was not running" });
            }
            WatchAction::Latest => print_json(&proxy.latest_recognition().await?),
        },
        Commands::Status => print_json(&proxy.status().await?),
        Commands::Compare { .. } | Commands::Inspect { .. } => {}
    }

    Ok(())
}

fn compare(a: &Path, b: &Path) -> Result<()> {
    let score = compare_images(a, b)?;
    let verdict = if score > ACCEPTANCE_THRESHOLD { "match" } else { "no match" };
    println!("similarity: {score:.4} ({verdict}, threshold {ACCEPTANCE_THRESHOLD})");
    Ok(())
}

fn compare_images(a: &Path, b: &Path) -> Result<f32> {
    let a = Thumbnail::from_image(&open_image(a)?)?;
    let b = Thumbnail::from_image(&open_image(b)?)?;
    Ok(similarity(&a, &b)?)
}

fn inspect(frame: &Path, detections: &Path, policy: SelectionPolicy, seed: Option<u64>, thumbnail: bool) -> Result<()> {
    let image = open_image(frame)?;
    let detections = facelens_core::parse_detections(&read_text(detections)?).context("invalid detections JSON")?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let analysis = facelens_core::analyze(
        &image,
        &detections,
        &EnrollmentStore::new(),
        &PixelDiffMatcher::default(),
        policy,
        &mut rng,
    )?;
    println!("{}", serde_json::to_string_pretty(&analysis.features)?);

    if thumbnail {
        let probe = Thumbnail::crop_from_frame(&image, &detections[analysis.detection_index])?;
        println!("{}", probe.to_data_url());
    }
    Ok(())
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// The daemon resolves paths from its own working directory.
fn absolute(path: &Path) -> Result<String> {
    let path = std::fs::canonicalize(path).with_context(|| format!("failed to resolve {}", path.display()))?;
    Ok(path.display().to_string())
}

fn print_json(reply: &str) {
    match serde_json::from_str::<serde_json::Value>(reply) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| reply.to_string())),
        Err(_) => println!("{reply}"),
    }
}
