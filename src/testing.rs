//! Test doubles shared by the unit tests.

use crate::assets::{AssetError, AssetResolver};
use crate::service::{CommandOutput, CommandRunner};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tiny_http::{Response, Server};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Content of the watched file when the call was made.
    pub observed: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MockRunner {
    calls: RefCell<Vec<RecordedCall>>,
    outputs: RefCell<Vec<CommandOutput>>,
    spawn_failures: RefCell<Vec<usize>>,
    watch: RefCell<Option<PathBuf>>,
}

impl MockRunner {
    pub fn push_output(&self, output: CommandOutput) {
        self.outputs.borrow_mut().push(output);
    }

    pub fn push_failure(&self, status_code: i32, stderr: &str) {
        self.push_output(CommandOutput {
            status_code,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        });
    }

    /// Makes the `index`th call (zero-based) fail to spawn.
    pub fn fail_spawn_at(&self, index: usize) {
        self.spawn_failures.borrow_mut().push(index);
    }

    pub fn watch(&self, path: &Path) {
        *self.watch.borrow_mut() = Some(path.to_path_buf());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, io::Error> {
        let observed = self
            .watch
            .borrow()
            .as_ref()
            .and_then(|path| fs::read(path).ok());
        let index = self.calls.borrow().len();
        self.calls.borrow_mut().push(RecordedCall {
            program: program.to_path_buf(),
            args: args.to_vec(),
            observed,
        });
        if self.spawn_failures.borrow().contains(&index) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        let mut queued = self.outputs.borrow_mut();
        if queued.is_empty() {
            return Ok(CommandOutput {
                status_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }
        Ok(queued.remove(0))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticAssets {
    entries: BTreeMap<(String, String), Vec<u8>>,
}

impl StaticAssets {
    pub fn with(mut self, addon: &str, target: &str, content: impl Into<Vec<u8>>) -> Self {
        self.entries
            .insert((addon.to_string(), target.to_string()), content.into());
        self
    }
}

impl AssetResolver for StaticAssets {
    fn resolve(&self, addon: &str, target: &str) -> Result<Vec<u8>, AssetError> {
        self.entries
            .get(&(addon.to_string(), target.to_string()))
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                addon: addon.to_string(),
                target: target.to_string(),
            })
    }
}

/// Local HTTP server answering fixed routes; anything else is a 404.
pub struct ArtifactServer {
    base: String,
    user_agents: Arc<Mutex<Vec<String>>>,
}

impl ArtifactServer {
    pub fn start(routes: Vec<(&str, u16, Vec<u8>)>) -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind artifact server");
        let port = server.server_addr().to_ip().expect("ip listener").port();
        let routes: BTreeMap<String, (u16, Vec<u8>)> = routes
            .into_iter()
            .map(|(path, status, body)| (path.to_string(), (status, body)))
            .collect();
        let user_agents = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&user_agents);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                if let Some(agent) = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("User-Agent"))
                {
                    seen.lock().unwrap().push(agent.value.as_str().to_string());
                }
                let response = match routes.get(request.url()) {
                    Some((status, body)) => {
                        Response::from_data(body.clone()).with_status_code(*status)
                    }
                    None => Response::from_data(b"not found".to_vec()).with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        Self {
            base: format!("http://127.0.0.1:{port}"),
            user_agents,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}
