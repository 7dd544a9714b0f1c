//! Sandbox double that replays canned tool output and records requests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use vulnhunter::sandbox::{ExecutionContext, Sandbox, SandboxError, SandboxOutput, SandboxRequest};

pub enum Reply {
    Output(SandboxOutput),
    Timeout,
}

pub struct ScriptedSandbox {
    available: bool,
    replies: HashMap<String, Reply>,
    requests: Mutex<Vec<SandboxRequest>>,
    pulled: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self {
            available: true,
            replies: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            pulled: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn reply(mut self, tool: &str, stdout: &str, stderr: &str, exit_code: i32) -> Self {
        self.replies.insert(
            tool.to_string(),
            Reply::Output(SandboxOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            }),
        );
        self
    }

    pub fn time_out(mut self, tool: &str) -> Self {
        self.replies.insert(tool.to_string(), Reply::Timeout);
        self
    }

    pub fn requests(&self) -> Vec<SandboxRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_for(&self, tool: &str) -> Option<SandboxRequest> {
        self.requests().into_iter().find(|r| r.tool == tool)
    }

    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }
}

impl Sandbox for ScriptedSandbox {
    fn run(
        &self,
        request: &SandboxRequest,
        ctx: &ExecutionContext,
    ) -> Result<SandboxOutput, SandboxError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.get(&request.tool) {
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Timeout) => Err(SandboxError::Timeout {
                limit: ctx.effective_timeout(request.timeout),
            }),
            None => Err(SandboxError::Precondition(format!(
                "no scripted reply for {}",
                request.tool
            ))),
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn ensure_image(&self, image: &str, _ctx: &ExecutionContext) -> Result<(), SandboxError> {
        self.pulled.lock().unwrap().push(image.to_string());
        Ok(())
    }
}

pub fn fixture(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(rel)
}

#[allow(dead_code)]
pub fn output(name: &str) -> String {
    std::fs::read_to_string(fixture(&format!("output/{name}"))).unwrap()
}
