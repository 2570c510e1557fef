use clap::Parser;
use std::path::PathBuf;

/// ddcbrightnessd — daemon for external monitor brightness over DDC/CI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: $XDG_CONFIG_HOME/ddcbrightnessd/config.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach and run as a daemon
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Log at debug level
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_all_flags() {
        let cli = Cli::parse_from(["ddcbrightnessd", "-v", "-c", "/tmp/config.yml"]);
        assert!(cli.verbose);
        assert!(!cli.daemonize);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.yml")));
    }

    #[test]
    fn defaults_are_quiet_and_foreground() {
        let cli = Cli::parse_from(["ddcbrightnessd"]);
        assert!(!cli.verbose);
        assert!(!cli.daemonize);
        assert_eq!(cli.config, None);
    }
}
