use super::{BatchSink, Manifest, Plugin, PluginContext};
use crate::{Error, Result};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use kestrel_types::{PluginMetadata, Query, QueryResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

/// Longest stdout line accepted from a plugin
const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct Request<'a> {
    method: &'static str,
    query: &'a Query,
}

/// One line of plugin stdout
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Response {
    Results {
        #[serde(default, deserialize_with = "kestrel_types::deserialize_null_as_empty_vec")]
        results: Vec<QueryResult>,
    },
    Error {
        message: String,
    },
}

/// A plugin backed by an executable speaking JSON lines over stdio.
///
/// The executable is started once per query. It receives
/// `{"method":"query","query":{...}}` on stdin and answers with any number
/// of `{"type":"results","results":[...]}` lines; the last one is final.
/// `{"type":"error","message":"..."}` fails the invocation.
#[derive(Debug, Clone)]
pub struct ProcessPlugin {
    metadata: PluginMetadata,
    program: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl ProcessPlugin {
    #[must_use]
    pub fn new(metadata: PluginMetadata, program: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            metadata,
            program,
            args: Vec::new(),
            working_dir,
        }
    }

    /// Build from a validated manifest found in `dir`.
    #[must_use]
    pub fn from_manifest(manifest: Manifest, dir: &Path) -> Self {
        let program = manifest.entry_path(dir);
        Self {
            metadata: manifest.metadata,
            program,
            args: manifest.args,
            working_dir: dir.to_path_buf(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    async fn run(&self, query: &Query, sink: BatchSink) -> Result<Vec<QueryResult>> {
        let id = self.metadata.id.as_str();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Process(format!("Failed to spawn {}: {}", self.program.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Process("Failed to get stdin handle".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Process("Failed to get stdout handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Process("Failed to get stderr handle".to_string()))?;

        let stderr_id = id.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("[{}] stderr: {}", stderr_id, line);
            }
        });

        let mut request = serde_json::to_string(&Request {
            method: "query",
            query,
        })?;
        request.push('\n');
        stdin.write_all(request.as_bytes()).await?;
        stdin.flush().await?;
        drop(stdin);

        let mut lines =
            FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        let mut last = Vec::new();

        loop {
            let line = tokio::select! {
                biased;
                () = sink.cancelled() => {
                    debug!("[{}] Cancelled, stopping process", id);
                    return Ok(last);
                }
                line = lines.next() => line,
            };
            let Some(line) = line else { break };
            let line = line.map_err(|e| Error::fault(id, format!("unreadable output: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Response>(&line) {
                Ok(Response::Results { results }) => {
                    debug!("[{}] Batch of {} result(s)", id, results.len());
                    sink.push(results.clone()).await;
                    last = results;
                }
                Ok(Response::Error { message }) => return Err(Error::fault(id, message)),
                Err(e) => {
                    return Err(Error::fault(id, format!("invalid JSON: {e} - Raw: {line}")));
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() && last.is_empty() {
            return Err(Error::fault(id, format!("exited with {status}")));
        }
        Ok(last)
    }
}

impl Plugin for ProcessPlugin {
    fn init(&self, _ctx: &PluginContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.program.is_file() {
                Ok(())
            } else {
                Err(Error::Plugin(format!(
                    "entry {} is not a file",
                    self.program.display()
                )))
            }
        })
    }

    fn query<'a>(
        &'a self,
        query: &'a Query,
        sink: BatchSink,
    ) -> BoxFuture<'a, Result<Vec<QueryResult>>> {
        Box::pin(self.run(query, sink))
    }
}
