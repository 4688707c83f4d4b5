//! Enumerates the files captured in a snapshot.
//!
//! Output order is fixed by the walker, not the server: entries of every directory are
//! sorted by name (byte order) and traversal is depth-first, so a directory's files appear
//! at the position of the directory itself. Traversal uses an explicit stack, so deep trees
//! grow the heap rather than the call stack.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};
use serde_derive::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::session::Session;
use crate::transport::Transport;
use crate::versions::{AddressingContext, SnapshotDescriptor};

const DIRECTORY_TYPE: &str = "kDirectory";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub full_path: String,
    pub entry_type: EntryType,
}

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(rename = "fullPath", default)]
    full_path: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Scopes a walk to one logical volume of a volume-based backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeScope {
    pub cookie: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub files: u64,
    pub volumes: usize,
}

/// Receives one full path per file, in traversal order.
pub trait PathSink {
    fn emit(&mut self, path: &str) -> Result<()>;
}

impl PathSink for Vec<String> {
    fn emit(&mut self, path: &str) -> Result<()> {
        self.push(path.to_string());
        Ok(())
    }
}

/// Adapts a closure into a [`PathSink`].
pub struct FnSink<F>(pub F);

impl<F> PathSink for FnSink<F>
where
    F: FnMut(&str) -> Result<()>,
{
    fn emit(&mut self, path: &str) -> Result<()> {
        (self.0)(path)
    }
}

/// Writes every path as a line to `out`, optionally echoing it on stdout.
///
/// The writer is owned by the sink and released when the sink is dropped, whether or not the
/// walk finished; call [`TeeSink::finish`] to flush and surface write errors.
pub struct TeeSink<W: Write> {
    out: W,
    echo: bool,
    lines: u64,
}

impl TeeSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, echo: bool) -> Result<TeeSink<BufWriter<File>>> {
        let file = File::create(path.as_ref())?;
        Ok(TeeSink::new(BufWriter::new(file), echo))
    }
}

impl<W: Write> TeeSink<W> {
    pub fn new(out: W, echo: bool) -> TeeSink<W> {
        TeeSink { out, echo, lines: 0 }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> PathSink for TeeSink<W> {
    fn emit(&mut self, path: &str) -> Result<()> {
        if self.echo {
            println!("{}", path);
        }
        writeln!(self.out, "{}", path)?;
        self.lines += 1;
        Ok(())
    }
}

/// `application/x-www-form-urlencoded` escaping, `/` included.
pub fn escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Child path of `dir`. Always inserts a separator, so children of `/` start with `//`,
/// which is the form the listing endpoint is addressed with.
pub fn join(dir: &str, name: &str) -> String {
    format!("{dir}/{name}")
}

pub fn directory_list_path(dir: &str, ctx: &AddressingContext, volume: Option<&VolumeScope>) -> String {
    let mut path = format!(
        "/vm/directoryList?{}&dirPath={}&statFileEntries=false",
        ctx.query(),
        escape(dir)
    );
    if let Some(volume) = volume {
        path.push_str(&format!(
            "&volumeInfoCookie={}&volumeName={}",
            volume.cookie,
            escape(&volume.name)
        ));
    }
    path
}

/// One listing call. Anything but a body with an `entries` array yields no entries.
pub fn list_directory<T: Transport>(
    session: &Session<T>,
    dir: &str,
    ctx: &AddressingContext,
    volume: Option<&VolumeScope>,
) -> Vec<DirEntry> {
    let response = session.get(&directory_list_path(dir, ctx, volume));
    let entries = match response.get("entries").and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|raw| match serde_json::from_value::<RawEntry>(raw.clone()) {
            Ok(raw) => {
                let entry_type = match raw.kind.as_deref() {
                    Some(DIRECTORY_TYPE) => EntryType::Directory,
                    _ => EntryType::File,
                };
                let full_path = raw.full_path.unwrap_or_else(|| join(dir, &raw.name));
                Some(DirEntry {
                    name: raw.name,
                    full_path,
                    entry_type,
                })
            }
            Err(err) => {
                warn!("skipping malformed entry in {}: {}", dir, err);
                None
            }
        })
        .collect()
}

enum Pending {
    Directory(String),
    File(String),
}

/// Walks the tree below `root`, emitting every file exactly once. Returns the file count.
pub fn walk<T, S>(
    session: &Session<T>,
    root: &str,
    ctx: &AddressingContext,
    sink: &mut S,
    volume: Option<&VolumeScope>,
) -> Result<u64>
where
    T: Transport,
    S: PathSink + ?Sized,
{
    let mut files = 0;
    let mut stack = vec![Pending::Directory(root.to_string())];

    while let Some(item) = stack.pop() {
        match item {
            Pending::File(path) => {
                sink.emit(&path)?;
                files += 1;
            }
            Pending::Directory(dir) => {
                let mut entries = list_directory(session, &dir, ctx, volume);
                debug!("{}: {} entries", dir, entries.len());
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                // reversed so the smallest name is popped first
                for entry in entries.into_iter().rev() {
                    if entry.is_directory() {
                        stack.push(Pending::Directory(join(&dir, &entry.name)));
                    } else {
                        stack.push(Pending::File(entry.full_path));
                    }
                }
            }
        }
    }
    Ok(files)
}

/// Volumes of a snapshot, sorted by name. Empty when the listing has no `volumeInfos`.
pub fn list_volumes<T: Transport>(session: &Session<T>, ctx: &AddressingContext) -> Vec<VolumeScope> {
    let response = session.get(&format!("/vm/volumeInfo?{}&statFileEntries=false", ctx.query()));
    let infos = match response.get("volumeInfos").and_then(Value::as_array) {
        Some(infos) => infos,
        None => return Vec::new(),
    };
    let cookie = match response.get("volumeInfoCookie") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let mut volumes: Vec<VolumeScope> = infos
        .iter()
        .filter_map(|info| info.get("name").and_then(Value::as_str))
        .map(|name| VolumeScope {
            cookie: cookie.clone(),
            name: name.to_string(),
        })
        .collect();
    volumes.sort_by(|a, b| a.name.cmp(&b.name));
    volumes
}

/// Walks a whole snapshot, volume by volume when the backup type calls for it.
pub fn walk_snapshot<T, S>(
    session: &Session<T>,
    snapshot: &SnapshotDescriptor,
    sink: &mut S,
) -> Result<WalkSummary>
where
    T: Transport,
    S: PathSink + ?Sized,
{
    let ctx = &snapshot.addressing;
    if !snapshot.is_volume_based() {
        let files = walk(session, "/", ctx, sink, None)?;
        return Ok(WalkSummary { files, volumes: 0 });
    }

    let mut summary = WalkSummary::default();
    for volume in list_volumes(session, ctx) {
        debug!("walking volume {}", volume.name);
        summary.files += walk(session, "/", ctx, sink, Some(&volume))?;
        summary.volumes += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_always_inserts_separator() {
        assert_eq!(join("/", "etc"), "//etc");
        assert_eq!(join("//etc", "hosts"), "//etc/hosts");
    }

    #[test]
    fn escape_is_form_encoding() {
        assert_eq!(escape("/"), "%2F");
        assert_eq!(escape("/My Docs/a&b"), "%2FMy+Docs%2Fa%26b");
        assert_eq!(escape("C:\\"), "C%3A%5C");
    }

    #[test]
    fn tee_sink_writes_lines() {
        let mut sink = TeeSink::new(Vec::new(), false);
        sink.emit("/a").unwrap();
        sink.emit("/b/c").unwrap();
        assert_eq!(sink.lines(), 2);
        assert_eq!(sink.finish().unwrap(), b"/a\n/b/c\n".to_vec());
    }

    #[test]
    fn fn_sink_forwards() {
        let mut seen = Vec::new();
        {
            let mut sink = FnSink(|p: &str| {
                seen.push(p.len());
                Ok(())
            });
            sink.emit("abc").unwrap();
        }
        assert_eq!(seen, vec![3]);
    }
}
