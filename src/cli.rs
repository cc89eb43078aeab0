use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Controller host to connect back to
    pub host: String,

    /// Controller TCP port
    pub port: u16,

    /// Maximum batch workers (0 = CPU count minus one)
    #[arg(default_value_t = 0)]
    pub max_workers: usize,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

#[cfg(test)]
mod tests {
    use super::CliOptions;
    use clap::Parser;

    #[test]
    fn parses_positional_endpoint() {
        let opts =
            CliOptions::try_parse_from(["checkworker", "127.0.0.1", "42424"]).expect("parse");
        assert_eq!(opts.host, "127.0.0.1");
        assert_eq!(opts.port, 42424);
        assert_eq!(opts.max_workers, 0);
    }

    #[test]
    fn parses_worker_cap() {
        let opts =
            CliOptions::try_parse_from(["checkworker", "localhost", "9000", "3"]).expect("parse");
        assert_eq!(opts.max_workers, 3);
    }

    #[test]
    fn rejects_missing_port() {
        assert!(CliOptions::try_parse_from(["checkworker", "localhost"]).is_err());
    }
}
