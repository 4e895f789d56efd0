use std::path::PathBuf;

use colored::Colorize;
use structopt::StructOpt;

use hdx::cli::base::{exit_code, Matcher};
use hdx::cli::dataset::DatasetSubCommand;
use hdx::cli::resource::ResourceSubCommand;
use hdx::configuration::{Configuration, Settings};
use hdx::logging::{init_logging, LogFormat};

static HEADER: &str = r#"
--- HDX Command Line Interface (HDXCLI) ---
"#;

#[derive(StructOpt, Debug)]
struct GlobalOpts {
    /// JSON/YAML settings file merged over the built-in settings.
    /// Without it, HDX_SITE, HDX_KEY and HDX_USER_AGENT are read.
    #[structopt(short, long)]
    config: Option<PathBuf>,

    /// Log output format (pretty or json)
    #[structopt(long, default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(StructOpt, Debug)]
#[structopt(about = "CLI to interact with HDX")]
#[allow(clippy::upper_case_acronyms)]
struct CLI {
    #[structopt(flatten)]
    global: GlobalOpts,

    #[structopt(subcommand)]
    cmd: HDXCLI,
}

#[derive(StructOpt, Debug)]
#[allow(clippy::upper_case_acronyms)]
enum HDXCLI {
    Dataset(DatasetSubCommand),
    Resource(ResourceSubCommand),
}

fn main() {
    let cli = CLI::from_args();
    init_logging(cli.global.log_format);

    let settings = match &cli.global.config {
        Some(path) => Settings::from_file(path),
        None => Settings::from_env(),
    };
    let configuration = match settings.and_then(Configuration::create) {
        Ok(configuration) => configuration,
        Err(err) => {
            eprintln!("{} {}", "Failed to set up the configuration:".red().bold(), err);
            std::process::exit(exit_code(&err));
        }
    };

    if atty::is(atty::Stream::Stdout) {
        println!("{}", HEADER.bold());
    }

    let code = match cli.cmd {
        HDXCLI::Dataset(command) => command.process(&configuration),
        HDXCLI::Resource(command) => command.process(&configuration),
    };
    std::process::exit(code);
}
