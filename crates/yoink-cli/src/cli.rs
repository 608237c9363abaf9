use clap::{ArgAction, Parser};

pub const YOINK_AFTER_HELP: &str = "\
Examples:
  yoink cowsay -- hello           run cowsay from the distro's cowsay package
  yoink htop@3.3.0-4              pin an exact package version (apt/dnf)
  yoink --purge-cache             delete every cached package

Environment:
  YOINK_CACHE_DIR     cache root (default /tmp/yoink)
  YOINK_VERBOSE       set to 1 to echo package manager output
  YOINK_LOCK_TIMEOUT  seconds to wait for another yoink fetching the same package
  YOINK_PROGRESS      0 hides the spinner, 1 forces it
";

#[derive(Parser, Debug)]
#[command(
    name = "yoink",
    author,
    version,
    about = "Run a binary from a distribution package without installing it",
    after_help = YOINK_AFTER_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct YoinkCli {
    #[arg(long, help = "Delete every cached package and exit", conflicts_with = "spec")]
    pub purge_cache: bool,
    #[arg(
        short,
        long,
        help = "Suppress yoink's own messages (errors still print to stderr)"
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Echo package manager output and increase logging (-vv reaches trace)"
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit a {status,message,details} JSON envelope on stdout")]
    pub json: bool,
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,
    #[arg(
        value_name = "SPEC",
        required_unless_present = "purge_cache",
        help = "Package to run, as NAME or NAME@VERSION"
    )]
    pub spec: Option<String>,
    #[arg(
        value_name = "ARG",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Arguments passed to the program unchanged"
    )]
    pub args: Vec<String>,
}
