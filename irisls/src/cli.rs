use std::path::PathBuf;

use clap;
use iris::session::AuthOptions;

use crate::error::{Error, Result};

pub fn parse_flags<'a>() -> clap::ArgMatches<'a> {
    app().get_matches()
}

pub fn app<'a, 'b>() -> clap::App<'a, 'b> {
    clap::App::new("irisls")
        .version(clap::crate_version!())
        .author(clap::crate_authors!())
        .about("List the backup versions of a protected object and the files they captured")
        .arg(clap::Arg::from_usage("--debug 'Enable debug output'").global(true))
        .arg(clap::Arg::from_usage("-v, --vip [vip] 'Cluster to connect to'").global(true))
        .arg(
            clap::Arg::from_usage("-u, --username [username] 'User to authenticate as'")
                .default_value("helios")
                .global(true),
        )
        .arg(
            clap::Arg::from_usage("-d, --domain [domain] 'Domain of the user'")
                .default_value("local")
                .global(true),
        )
        .arg(
            clap::Arg::from_usage("-i, --useApiKey 'Authenticate with an API key through helios'")
                .alias("helios")
                .global(true),
        )
        .arg(clap::Arg::from_usage("-p, --password [password] 'Password or API key (otherwise stored or prompted)'").global(true))
        .arg(clap::Arg::from_usage("--updatePassword 'Discard the stored password and ask again'").global(true))
        .arg(clap::Arg::from_usage("--prompt 'Ask for the password without storing it'").global(true))
        .arg(clap::Arg::from_usage("-c, --cluster [cluster] 'Cluster to use when connected through helios'").global(true))
        .arg(clap::Arg::from_usage("--config-dir [config_dir] 'Directory holding stored passwords'").global(true))
        .arg(clap::Arg::from_usage("-s, --sourceserver [sourceserver] 'Name of the protected object'"))
        .arg(clap::Arg::from_usage("-j, --jobname [jobname] 'Protection job the object belongs to'"))
        .arg(clap::Arg::from_usage("-l, --showversions 'Show available versions'"))
        .arg(clap::Arg::from_usage("-k, --listfiles 'List files of every selected version'"))
        .arg(clap::Arg::from_usage("-t, --start [start] 'Only versions at or after this date (YYYY-MM-DD HH:MM:SS)'"))
        .arg(clap::Arg::from_usage("-e, --end [end] 'Only versions at or before this date (YYYY-MM-DD HH:MM:SS)'"))
        .arg(clap::Arg::from_usage("-r, --runid [runid] 'List files of the version with this run id'"))
        .arg(clap::Arg::from_usage("-f, --filedate [filedate] 'List files of the first version at or after this date'"))
        .arg(
            clap::Arg::from_usage("-o, --output-dir [output_dir] 'Where file lists are written'")
                .default_value("."),
        )
        .subcommand(
            clap::SubCommand::with_name("store-password")
                .about("Store the password for --vip/--username/--domain for later runs"),
        )
        .subcommand(
            clap::SubCommand::with_name("clusters")
                .about("Show the clusters connected to helios"),
        )
}

/// Flags describing what to list, once connected.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub source: String,
    pub job: String,
    pub show_versions: bool,
    pub list_files: bool,
    pub start: Option<String>,
    pub end: Option<String>,
    pub run_id: Option<i64>,
    pub file_date: Option<String>,
    pub output_dir: PathBuf,
}

impl ListOptions {
    pub fn from_matches(matches: &clap::ArgMatches) -> Result<ListOptions> {
        let required = |name: &str| {
            matches
                .value_of(name)
                .map(str::to_string)
                .ok_or_else(|| Error::CliInputError(format!("--{} is required.", name)))
        };
        let run_id = match matches.value_of("runid") {
            Some(v) => Some(v.parse::<i64>().map_err(|_| {
                Error::CliInputError(format!("--runid expects a number, got '{}'", v))
            })?),
            None => None,
        };
        Ok(ListOptions {
            source: required("sourceserver")?,
            job: required("jobname")?,
            show_versions: matches.is_present("showversions"),
            list_files: matches.is_present("listfiles"),
            start: matches.value_of("start").map(str::to_string),
            end: matches.value_of("end").map(str::to_string),
            run_id,
            file_date: matches.value_of("filedate").map(str::to_string),
            output_dir: PathBuf::from(matches.value_of("output-dir").unwrap_or(".")),
        })
    }

    /// Listing versions (or files of several versions) rather than picking one.
    pub fn lists_versions(&self) -> bool {
        self.show_versions || self.list_files || self.start.is_some() || self.end.is_some()
    }
}

pub fn auth_options(matches: &clap::ArgMatches) -> Result<AuthOptions> {
    let brokered = matches.is_present("useApiKey");
    let host = match (matches.value_of("vip"), brokered) {
        (Some(vip), _) => vip.to_string(),
        (None, true) => iris::session::BROKER_HOST.to_string(),
        (None, false) => {
            return Err(Error::CliInputError(
                "--vip is required unless --useApiKey is given.".to_string(),
            ))
        }
    };
    Ok(AuthOptions {
        host,
        username: matches.value_of("username").unwrap_or("helios").to_string(),
        domain: matches.value_of("domain").unwrap_or("local").to_string(),
        password: matches.value_of("password").map(str::to_string),
        update_password: matches.is_present("updatePassword"),
        prompt: matches.is_present("prompt"),
        brokered,
        quiet: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> clap::ArgMatches<'static> {
        let mut argv = vec!["irisls"];
        argv.extend_from_slice(args);
        app().get_matches_from(argv)
    }

    #[test]
    fn list_options_from_flags() {
        let m = parse(&["-v", "c1", "-s", "vm1", "-j", "Nightly", "-r", "42", "-k"]);
        let opts = ListOptions::from_matches(&m).unwrap();
        assert_eq!(opts.source, "vm1");
        assert_eq!(opts.job, "Nightly");
        assert_eq!(opts.run_id, Some(42));
        assert!(opts.list_files);
        assert!(opts.lists_versions());
        assert_eq!(opts.output_dir, PathBuf::from("."));
    }

    #[test]
    fn run_id_must_be_numeric() {
        let m = parse(&["-v", "c1", "-s", "vm1", "-j", "job", "-r", "abc"]);
        assert!(matches!(
            ListOptions::from_matches(&m),
            Err(Error::CliInputError(_))
        ));
    }

    #[test]
    fn source_and_job_are_required() {
        let m = parse(&["-v", "c1", "-s", "vm1"]);
        assert!(ListOptions::from_matches(&m).is_err());
    }

    #[test]
    fn auth_defaults() {
        let m = parse(&["-v", "c1"]);
        let auth = auth_options(&m).unwrap();
        assert_eq!(auth.host, "c1");
        assert_eq!(auth.username, "helios");
        assert_eq!(auth.domain, "local");
        assert!(!auth.brokered);
        assert!(auth.password.is_none());
    }

    #[test]
    fn api_key_mode_defaults_to_broker_host() {
        let m = parse(&["-i", "-p", "key"]);
        let auth = auth_options(&m).unwrap();
        assert!(auth.is_brokered());
        assert_eq!(auth.password.as_deref(), Some("key"));
        assert!(auth_options(&parse(&[])).is_err());
    }
}
