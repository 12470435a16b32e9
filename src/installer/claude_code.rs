//! Claude Code CLI, installed globally through npm.
//!
//! There is no direct-download strategy: if npm is missing or the install
//! fails, the step fails and the user is pointed at Node.js.

use async_trait::async_trait;

use super::{Component, ComponentSpec};

pub const PACKAGE: &str = "@anthropic-ai/claude-code";

pub struct ClaudeCode {
    spec: ComponentSpec,
}

impl ClaudeCode {
    pub fn new(spec: ComponentSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Component for ClaudeCode {
    fn spec(&self) -> &ComponentSpec {
        &self.spec
    }
}
