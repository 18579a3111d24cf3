use clap::Parser;
use hazard_track::pipeline::Pipeline;
use hazard_track::replay::DumpReader;
use hazard_track::warning::{describe_tracks, Announcer, LogSink, LogSpeaker, WarningSink};
use hazard_track::{Config, Error, HazardSignal, HazardTracker, Tracking};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replays a recorded detections dump through the hazard tracker.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opts {
    /// Detections dump, one `<offset_ms>: <json array>` line per frame
    #[arg(short, long)]
    input: String,

    /// YAML config; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    #[arg(short, long, default_value = "camera")]
    source: String,

    /// Feed frames through the threaded latest-frame-wins pipeline
    #[arg(long)]
    threaded: bool,

    /// Print every hazard signal as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Voice warnings through the log instead of structured records
    #[arg(long)]
    speak: bool,
}

struct Output {
    json: bool,
    speaker: Option<Announcer<LogSpeaker>>,
    log: LogSink,
}

impl WarningSink for Output {
    fn emit(&mut self, signals: &[HazardSignal]) {
        if self.json {
            for s in signals {
                match s.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(err) => tracing::warn!("cannot serialize signal: {}", err),
                }
            }
        }

        match &mut self.speaker {
            Some(announcer) => announcer.emit(signals),
            None => self.log.emit(signals),
        }
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hazard_track=info,replay=info")),
        )
        .init();

    let opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    info!(input = %opts.input, threaded = opts.threaded, "replaying detections");

    let output = Output {
        json: opts.json,
        speaker: opts
            .speak
            .then(|| Announcer::new(&config.warnings, LogSpeaker)),
        log: LogSink,
    };

    let frames = DumpReader::open(&opts.input, (opts.width, opts.height))?;

    if opts.threaded {
        let pipeline = Pipeline::spawn(config, &opts.source, output)?;
        for frame in frames {
            pipeline.submit(frame?)?;
        }

        let stats = pipeline.shutdown()?;
        info!(
            processed = stats.processed,
            dropped = stats.dropped,
            signals = stats.signals,
            fps = stats.rate,
            "replay finished"
        );
    } else {
        let mut output = output;
        let mut tracker = HazardTracker::new(config);
        let (mut processed, mut signals) = (0u64, 0u64);

        for frame in frames {
            let found = tracker.update(&frame?, &opts.source);
            output.emit(&found);

            processed += 1;
            signals += found.len() as u64;
        }

        info!(processed, signals, "replay finished");
        info!("{}", describe_tracks(&tracker.tracks(&opts.source)));
    }

    Ok(())
}
