//! repofs REPL: an interactive shell over a workspace.
//!
//! Mounts a local directory as the remote snapshot and lets you edit it
//! through the overlay:
//!
//! - Browse and edit: `ls`, `cat`, `write`, `mkdir`, `rm [-r]`, `mv`, `stat`
//! - Source control: `status`, `diff [path]`, `blobs`
//! - Meta: `help`, `quit`
//!
//! Relative paths resolve against the repository root.

pub mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use repofs_kernel::{
    ContentProvider, FileStatus, FileType, LocalContentProvider, Manifest, RmOptions, Workspace,
};

pub use config::{ReplConfig, SnapshotConfig};

/// REPL state: one workspace for the whole session.
pub struct Repl {
    workspace: Workspace,
    quit: bool,
}

impl Repl {
    /// Wrap an existing workspace.
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            quit: false,
        }
    }

    /// Build a workspace from the configured snapshot.
    pub async fn open(config: &ReplConfig) -> Result<Self> {
        let dir = config
            .snapshot
            .dir
            .clone()
            .context("No snapshot directory configured")?;
        let provider = LocalContentProvider::new(&dir);

        let manifest = match &config.snapshot.manifest {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read manifest {}", path.display()))?;
                let mut manifest = Manifest::from_json(&json)
                    .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
                manifest.repo_root = config.snapshot.repo_root.clone();
                manifest
            }
            None => provider
                .manifest(&config.snapshot.repo_root)
                .await
                .with_context(|| format!("Failed to walk snapshot {}", dir.display()))?,
        };

        let provider: Arc<dyn ContentProvider> = Arc::new(provider);
        let workspace = Workspace::new(&manifest, provider, &config.overlay)
            .context("Failed to build workspace")?;
        tracing::info!(
            snapshot = %dir.display(),
            repo_root = %workspace.repo_root().display(),
            entries = manifest.entries.len(),
            "mounted snapshot"
        );
        Ok(Self::new(workspace))
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// True once `quit` has been entered.
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    fn resolve(&self, arg: &str) -> PathBuf {
        if arg.starts_with('/') {
            PathBuf::from(arg)
        } else {
            self.workspace.repo_root().join(arg)
        }
    }

    /// Process a single line of input.
    pub async fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let (command, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (trimmed, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();
        let fs = &self.workspace.fs;

        match command {
            "help" | "?" => Ok(Some(HELP_TEXT.trim_end().to_string())),
            "quit" | "exit" => {
                self.quit = true;
                Ok(None)
            }
            "ls" => {
                let path = self.resolve(args.first().copied().unwrap_or(""));
                let entries = fs
                    .readdir_with_types(&path)
                    .await
                    .with_context(|| format!("ls {}", path.display()))?;
                let names: Vec<String> = entries
                    .into_iter()
                    .map(|e| match e.file_type {
                        FileType::Directory => format!("{}/", e.name),
                        FileType::File => e.name,
                    })
                    .collect();
                Ok(non_empty(names.join("\n")))
            }
            "cat" => {
                let path = self.resolve(one_arg(command, &args)?);
                let bytes = fs
                    .read_file(&path)
                    .await
                    .with_context(|| format!("cat {}", path.display()))?;
                Ok(non_empty(
                    String::from_utf8_lossy(&bytes).trim_end().to_string(),
                ))
            }
            "write" => {
                let (target, text) = rest
                    .split_once(char::is_whitespace)
                    .context("usage: write <path> <text>")?;
                let path = self.resolve(target);
                let mut content = text.trim_start().to_string();
                content.push('\n');
                fs.write_file(&path, content.as_bytes())
                    .await
                    .with_context(|| format!("write {}", path.display()))?;
                Ok(None)
            }
            "mkdir" => {
                let path = self.resolve(one_arg(command, &args)?);
                fs.mkdir(&path)
                    .await
                    .with_context(|| format!("mkdir {}", path.display()))?;
                Ok(None)
            }
            "rm" => {
                let (recursive, target) = match args.as_slice() {
                    ["-r", target] | ["-rf", target] => (true, *target),
                    [target] => (false, *target),
                    _ => anyhow::bail!("usage: rm [-r] <path>"),
                };
                let path = self.resolve(target);
                fs.rm(&path, RmOptions { recursive })
                    .await
                    .with_context(|| format!("rm {}", path.display()))?;
                Ok(None)
            }
            "mv" => {
                let [from, to] = args.as_slice() else {
                    anyhow::bail!("usage: mv <from> <to>");
                };
                let (from, to) = (self.resolve(from), self.resolve(to));
                fs.rename(&from, &to)
                    .await
                    .with_context(|| format!("mv {} {}", from.display(), to.display()))?;
                Ok(None)
            }
            "stat" => {
                let path = self.resolve(one_arg(command, &args)?);
                let stats = fs
                    .stat(&path)
                    .await
                    .with_context(|| format!("stat {}", path.display()))?;
                let kind = if stats.is_directory() { "dir" } else { "file" };
                Ok(Some(format!(
                    "{kind} size={} mode={:o} mtime={}",
                    stats.size_or_unknown(),
                    stats.mode,
                    stats.mtime_millis()
                )))
            }
            "status" => {
                let statuses = self.workspace.source_control.status().await?;
                if statuses.is_empty() {
                    return Ok(Some("clean".to_string()));
                }
                let lines: Vec<String> = statuses.iter().map(format_status).collect();
                Ok(Some(lines.join("\n")))
            }
            "diff" => {
                let paths: Vec<PathBuf> = match args.first() {
                    Some(arg) => vec![self.resolve(arg)],
                    None => self
                        .workspace
                        .source_control
                        .status()
                        .await?
                        .iter()
                        .map(|s| self.resolve(s.path().trim_start_matches('/')))
                        .collect(),
                };
                let mut out = String::new();
                for path in paths {
                    out.push_str(&self.workspace.source_control_fs.diff(&path).await?);
                }
                Ok(non_empty(out.trim_end().to_string()))
            }
            "blobs" => {
                let blobs = self.workspace.blobs.list_all_blobs().await?;
                let lines: Vec<&str> = blobs.iter().map(String::as_str).collect();
                Ok(non_empty(lines.join("\n")))
            }
            "mtime" => Ok(Some(fs.last_modified_time().await?.to_string())),
            other => Ok(Some(format!(
                "Unknown command: {other}\nType help for available commands."
            ))),
        }
    }
}

fn one_arg<'a>(command: &str, args: &[&'a str]) -> Result<&'a str> {
    match args {
        [arg] => Ok(*arg),
        _ => anyhow::bail!("usage: {command} <path>"),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Short status line for a status entry, `M /README.md`.
pub fn format_status(status: &FileStatus) -> String {
    format!("{} {}", status.code(), status.path())
}

const HELP_TEXT: &str = r#"repofs: edit a repository snapshot through an overlay

Files:
  ls [path]             List a directory (default: repository root)
  cat <path>            Print a file
  write <path> <text>   Replace a file's content with <text>
  mkdir <path>          Create a directory
  rm [-r] <path>        Remove a file or directory
  mv <from> <to>        Rename a file or directory
  stat <path>           Show type, size, mode and mtime

Source control:
  status                Changed files (A added, M modified, D deleted)
  diff [path]           Unified diff against the snapshot
  blobs                 Every file in the working copy
  mtime                 Last modification time (ms)

  help                  Show this help
  quit, exit            Leave the shell

Relative paths resolve against the repository root.
"#;

/// Run the REPL until EOF or `quit`.
pub fn run(config: &ReplConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let mut repl = runtime.block_on(Repl::open(config))?;

    println!("repofs v{} ({})", env!("CARGO_PKG_VERSION"), repl.workspace().repo_root().display());
    println!("Type help for commands, quit to exit.\n");

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;

    let history_path = ReplConfig::history_path();
    if let Some(ref path) = history_path {
        // Explicitly ignored: a missing history file is normal on first run
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline("repofs> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());

                match runtime.block_on(repl.process_line(&line)) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) => eprintln!("Error: {:#}", e),
                }
                if repl.should_quit() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    if let Some(ref path) = history_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }

    Ok(())
}

/// Run `;`-separated commands non-interactively, printing their output.
pub fn run_commands(config: &ReplConfig, commands: &str) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let mut repl = Repl::open(config).await?;
        for command in commands.split(';') {
            if let Some(output) = repl.process_line(command).await? {
                println!("{}", output);
            }
            if repl.should_quit() {
                break;
            }
        }
        Ok(())
    })
}

/// Resolve a manifest path relative to the current directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to read current directory")?
        .join(path))
}
