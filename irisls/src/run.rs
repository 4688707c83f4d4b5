use std::path::PathBuf;

use iris::credentials::{CredentialStore, Prompter};
use iris::date::{date_to_usecs, file_stamp};
use iris::display;
use iris::session::{AuthOutcome, Session};
use iris::transport::Transport;
use iris::versions::{self, SelectError, SnapshotDescriptor};
use iris::walker::{self, TeeSink, WalkSummary};
use log::debug;

use crate::cli::{self, ListOptions};
use crate::error::Result;

pub const EXIT_OK: i32 = 0;
pub const EXIT_NOT_FOUND: i32 = 1;

/// How a listing ended when nothing went wrong locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    NotFound(String),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Done => EXIT_OK,
            Outcome::NotFound(_) => EXIT_NOT_FOUND,
        }
    }
}

impl From<SelectError> for Outcome {
    fn from(err: SelectError) -> Outcome {
        Outcome::NotFound(err.to_string())
    }
}

/// Path separators in `source` become `_` so the file stays inside the output directory.
pub fn output_file_name(source: &str, snapshot: &SnapshotDescriptor) -> String {
    format!(
        "backedUpFiles-{}-{}-{}.txt",
        source.replace(['/', '\\'], "_"),
        snapshot.run_instance_id,
        file_stamp(snapshot.job_start_time_usecs)
    )
}

/// Writes the file list of one snapshot to its own file, echoing every path.
pub fn show_files<T: Transport>(
    session: &Session<T>,
    opts: &ListOptions,
    snapshot: &SnapshotDescriptor,
) -> Result<(PathBuf, WalkSummary)> {
    let path = opts.output_dir.join(output_file_name(&opts.source, snapshot));
    debug!("writing file list to {}", path.display());
    let mut sink = TeeSink::create(&path, true)?;
    let summary = walker::walk_snapshot(session, snapshot, &mut sink)?;
    sink.finish()?;
    Ok((path, summary))
}

/// Searches for the object, then lists versions or files as the options ask.
pub fn list<T: Transport>(session: &Session<T>, opts: &ListOptions) -> Result<Outcome> {
    let docs = match versions::search(session, &opts.source) {
        Ok(docs) => docs,
        Err(err) => return Ok(err.into()),
    };
    let doc = match versions::select_document(docs, &opts.source, &opts.job) {
        Ok(doc) => doc,
        Err(err) => return Ok(err.into()),
    };
    let snapshots = doc.snapshots();

    if opts.lists_versions() {
        let start = opts.start.as_deref().map(date_to_usecs).transpose()?;
        let end = opts.end.as_deref().map(date_to_usecs).transpose()?;
        let selected = versions::filter_by_range(&snapshots, start, end);
        if opts.list_files {
            for snapshot in &selected {
                println!("{}", display::run_header(snapshot));
                show_files(session, opts, snapshot)?;
            }
        } else {
            print!("{}", display::version_table(&selected));
        }
        return Ok(Outcome::Done);
    }

    let chosen = if let Some(run_id) = opts.run_id {
        versions::find_run(&snapshots, run_id)
    } else if let Some(ref date) = opts.file_date {
        versions::find_at_or_after(&snapshots, date_to_usecs(date)?)
    } else {
        versions::latest(&snapshots)
    };
    match chosen {
        Ok(snapshot) => {
            show_files(session, opts, snapshot)?;
            Ok(Outcome::Done)
        }
        Err(err) => Ok(err.into()),
    }
}

fn credential_store(matches: &clap::ArgMatches) -> Result<CredentialStore> {
    Ok(match matches.value_of("config-dir") {
        Some(dir) => CredentialStore::new(dir),
        None => CredentialStore::from_env()?,
    })
}

fn store_password<P: Prompter>(matches: &clap::ArgMatches, store: &CredentialStore<P>) -> Result<i32> {
    let auth = cli::auth_options(matches)?;
    let host = if auth.is_brokered() {
        iris::session::BROKER_HOST
    } else {
        auth.host.as_str()
    };
    match auth.password {
        Some(ref secret) => {
            store.store_from_input(host, &auth.username, &auth.domain, secret)?;
        }
        None => {
            store.store(host, &auth.username, &auth.domain, None, false)?;
        }
    }
    println!("Password stored for {}@{} on {}", auth.username, auth.domain, host);
    Ok(EXIT_OK)
}

/// Connects, optionally routes to a helios cluster, then runs the requested command.
pub fn execute<T: Transport, P: Prompter>(
    matches: &clap::ArgMatches,
    session: &mut Session<T>,
    store: &CredentialStore<P>,
) -> Result<i32> {
    if let ("store-password", Some(_)) = matches.subcommand() {
        return store_password(matches, store);
    }

    let auth = cli::auth_options(matches)?;
    let list_opts = match matches.subcommand_name() {
        Some("clusters") => None,
        _ => Some(ListOptions::from_matches(matches)?),
    };

    let outcome = session.authenticate(&auth, store);
    match outcome {
        AuthOutcome::Connected => {}
        // the session has already reported why
        AuthOutcome::Rejected(message) | AuthOutcome::Unreachable(message) => {
            debug!("not connected: {}", message);
            return Ok(EXIT_NOT_FOUND);
        }
    }
    println!("Connected!");

    if let Some(cluster) = matches.value_of("cluster") {
        // the session reports the miss itself
        if !session.select_cluster(cluster) {
            return Ok(EXIT_NOT_FOUND);
        }
    }

    let opts = match list_opts {
        Some(opts) => opts,
        None => {
            print!("{}", display::cluster_table(&session.connected_clusters()));
            return Ok(EXIT_OK);
        }
    };

    let outcome = list(session, &opts)?;
    if let Outcome::NotFound(ref message) = outcome {
        println!("{}", message);
    }
    Ok(outcome.exit_code())
}

pub fn run(matches: &clap::ArgMatches) -> Result<i32> {
    let store = credential_store(matches)?;
    if let ("store-password", Some(_)) = matches.subcommand() {
        return store_password(matches, &store);
    }
    let mut session = Session::new()?;
    execute(matches, &mut session, &store)
}
