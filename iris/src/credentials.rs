//! Stored secrets, one file per `(host, username, domain)`.
//!
//! # Not encryption
//!
//! Secrets are written as the decimal code points of their characters, each shifted by one,
//! separated by `", "`. Anyone who can read the file can recover the secret. The format is a
//! deterrent against casual shoulder-surfing of the config directory and nothing more. Files
//! written by earlier installations must keep decoding.

#[cfg(any(test, feature = "testing"))]
use std::cell::RefCell;
#[cfg(any(test, feature = "testing"))]
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};

pub const CONFIG_DIR_ENV: &str = "IRIS_CONFIG_DIR";
pub const DEFAULT_CONFIG_DIR_NAME: &str = ".iris";

const PASSWORD_PROMPT: &str = "Enter your password: ";
const CONFIRM_PROMPT: &str = "Re-enter your password: ";
const SEPARATOR: &str = ", ";
const SHIFT: u32 = 1;

/// Source of interactively typed secrets.
pub trait Prompter {
    fn prompt(&self, message: &str) -> std::io::Result<String>;
}

/// Reads from the controlling terminal with echo disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&self, message: &str) -> std::io::Result<String> {
        rpassword::prompt_password(message)
    }
}

/// Answers prompts from a fixed script, in order. Running out of answers is an I/O error.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

#[cfg(any(test, feature = "testing"))]
impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> ScriptedPrompter
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedPrompter {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Prompts shown so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

#[cfg(any(test, feature = "testing"))]
impl Prompter for ScriptedPrompter {
    fn prompt(&self, message: &str) -> std::io::Result<String> {
        self.asked.borrow_mut().push(message.to_string());
        self.answers.borrow_mut().pop_front().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no scripted answer left")
        })
    }
}

/// `$IRIS_CONFIG_DIR` if set, otherwise `~/.iris`.
pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_CONFIG_DIR_NAME))
        .ok_or(Error::ConfigDirUnavailable)
}

pub fn encode(secret: &str) -> String {
    secret
        .chars()
        .map(|c| (c as u32 + SHIFT).to_string())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Reverses [`encode`]. `None` if any code is not a number or does not map back to a `char`.
pub fn decode(encoded: &str) -> Option<String> {
    encoded
        .trim_end_matches(['\r', '\n'])
        .split(SEPARATOR)
        .map(|code| {
            code.trim()
                .parse::<u32>()
                .ok()
                .and_then(|n| n.checked_sub(SHIFT))
                .and_then(char::from_u32)
        })
        .collect()
}

pub struct CredentialStore<P: Prompter = TerminalPrompter> {
    dir: PathBuf,
    prompter: P,
}

impl CredentialStore<TerminalPrompter> {
    pub fn new<D: Into<PathBuf>>(dir: D) -> CredentialStore<TerminalPrompter> {
        CredentialStore::with_prompter(dir, TerminalPrompter)
    }

    pub fn from_env() -> Result<CredentialStore<TerminalPrompter>> {
        Ok(CredentialStore::new(default_config_dir()?))
    }
}

impl<P: Prompter> CredentialStore<P> {
    pub fn with_prompter<D: Into<PathBuf>>(dir: D, prompter: P) -> CredentialStore<P> {
        CredentialStore {
            dir: dir.into(),
            prompter,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Where the secret for this tuple lives. Does not touch the filesystem.
    pub fn path_for(&self, host: &str, username: &str, domain: &str) -> PathBuf {
        self.dir.join(format!("lt.{host}.{username}.{domain}"))
    }

    /// Resolves a secret.
    ///
    /// A `supplied` secret wins and is never persisted, and so does an `interactive` prompt.
    /// Otherwise the stored file is decoded; if it is missing or unreadable the user is
    /// prompted and the answer is stored for next time. `force_refresh` discards the stored
    /// file first.
    pub fn get(
        &self,
        host: &str,
        username: &str,
        domain: &str,
        supplied: Option<&str>,
        force_refresh: bool,
        interactive: bool,
    ) -> Result<String> {
        if let Some(secret) = supplied {
            return Ok(secret.to_string());
        }
        if interactive {
            return self.ask(PASSWORD_PROMPT);
        }

        self.ensure_dir()?;
        let path = self.path_for(host, username, domain);
        if force_refresh && path.is_file() {
            debug!("removing stored secret {}", path.display());
            fs::remove_file(&path)?;
        }

        match self.read(&path) {
            Ok(secret) => Ok(secret),
            Err(err) => {
                debug!("no usable stored secret: {}", err);
                let secret = self.ask(PASSWORD_PROMPT)?;
                fs::write(&path, encode(&secret))?;
                Ok(secret)
            }
        }
    }

    /// Prompts twice until both answers agree, persisting the confirmed secret.
    pub fn store(
        &self,
        host: &str,
        username: &str,
        domain: &str,
        supplied: Option<&str>,
        interactive: bool,
    ) -> Result<String> {
        loop {
            let first = self.get(host, username, domain, supplied, true, interactive)?;
            let second = self.ask(CONFIRM_PROMPT)?;
            if first == second {
                return Ok(first);
            }
            warn!("Passwords do not match! Please re-enter...");
        }
    }

    /// Persists `secret` without any prompting.
    pub fn store_from_input(
        &self,
        host: &str,
        username: &str,
        domain: &str,
        secret: &str,
    ) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path_for(host, username, domain);
        fs::write(&path, encode(secret))?;
        Ok(path)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.is_dir() {
            debug!("creating config directory {}", self.dir.display());
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<String> {
        let content = fs::read_to_string(path)?;
        decode(&content).ok_or_else(|| Error::InvalidCredentialFile(path.to_path_buf()))
    }

    fn ask(&self, message: &str) -> Result<String> {
        self.prompter.prompt(message).map_err(Error::Prompt)
    }
}
