use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use clap::Parser;

use trip_orchestrator::config::{OrchestratorConfig, RetryConfig};
use trip_orchestrator::server::{AppState, startup};

#[derive(Debug, Parser)]
#[command(name = "trip-orchestrator", about = "Travel-planning pipeline orchestrator")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Attempts per stage call before the run fails.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Per-attempt timeout for stage calls, in seconds.
    #[arg(long, default_value_t = 120)]
    stage_timeout: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = OrchestratorConfig::from_env(args.host, args.port);
    config.retry = RetryConfig {
        max_attempts: args.max_attempts,
        ..RetryConfig::default()
    };
    config.stage_timeout = std::time::Duration::from_secs(args.stage_timeout);

    let level = if config.verbose_payloads {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .target(env_logger::Target::Pipe(Box::new(TeeWriter::new(log_file))))
        .init();

    let app_state = AppState::new(&config)?;
    actix_web::rt::System::new().block_on(async move { startup(config, app_state).await })?;
    Ok(())
}

/// Mirrors every log line to stderr and to the log file that `/debug/logs`
/// reads back.
struct TeeWriter {
    file: File,
}

impl TeeWriter {
    fn new(file: File) -> Self {
        TeeWriter { file }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}
