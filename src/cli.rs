mod run;

use {
    crate::{config::ApplyConfig, logger::Logger, utils::errorfmt::ErrorFmt},
    ::log::Level,
    clap::{Args, Parser, Subcommand, ValueEnum},
    std::{path::PathBuf, process},
};

/// Drives the display apply pipeline against a simulated display controller.
#[derive(Parser, Debug)]
#[command(version)]
struct DssApply {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// The log level.
    #[arg(value_enum, long, global = true, default_value_t)]
    pub log_level: CliLogLevel,
    /// A JSON file with pipeline tunables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Run a scripted scenario on one pipe.
    Run(RunArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(ValueEnum, Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CliChannel {
    #[default]
    Lcd,
    Tv,
    Lcd2,
    Lcd3,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The channel to drive.
    #[arg(value_enum, long, default_value_t)]
    pub channel: CliChannel,
    /// The number of manager property changes to submit while the pipe is on.
    #[arg(long, default_value_t = 8)]
    pub requests: u32,
    /// Simulate a digit channel without a frame-done irq.
    #[arg(long)]
    pub no_digit_framedone: bool,
    /// Connect the pipe to an HDMI output. Only valid for the tv channel.
    #[arg(long)]
    pub hdmi: bool,
}

#[derive(ValueEnum, Debug, Copy, Clone, Hash, Default, PartialEq)]
pub enum CliLogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl Into<Level> for CliLogLevel {
    fn into(self) -> Level {
        match self {
            CliLogLevel::Error => Level::Error,
            CliLogLevel::Warn => Level::Warn,
            CliLogLevel::Info => Level::Info,
            CliLogLevel::Debug => Level::Debug,
            CliLogLevel::Trace => Level::Trace,
        }
    }
}

pub fn main() {
    let cli = DssApply::parse();
    Logger::install_stderr(cli.global.log_level.into());
    let config = match &cli.global.config {
        Some(path) => match ApplyConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("{}", ErrorFmt(e));
                process::exit(1);
            }
        },
        None => ApplyConfig::default(),
    };
    match cli.command {
        Cmd::Run(a) => {
            if let Err(e) = run::main(config, a) {
                log::error!("{}", ErrorFmt(e));
                process::exit(1);
            }
        }
        Cmd::Config => println!("{:#?}", config),
    }
}
