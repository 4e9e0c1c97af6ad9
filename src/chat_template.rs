use crate::{Error, Result};
use minijinja::{context, Environment, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const NAME: &str = "chat";

/// One chat turn. Fields besides `role` and `content`, such as `tool_calls`,
/// reach the template unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            extra: Map::new(),
        }
    }
}

/// A compiled Jinja chat template, as found under `chat_template` in a
/// `tokenizer_config.json`.
///
/// Rendering only reads the template, so one instance may serve any number
/// of threads.
pub struct ChatTemplate {
    env: Environment<'static>,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

impl ChatTemplate {
    pub fn new(
        template: impl Into<String>,
        bos_token: Option<String>,
        eos_token: Option<String>,
    ) -> Result<Self> {
        let mut env = Environment::new();
        env.add_function("raise_exception", raise_exception);
        env.add_template_owned(NAME, template.into())
            .map_err(|e| Error::MalformedConfig(format!("chat template: {e}")))?;
        debug!("chat template loaded");
        Ok(Self {
            env,
            bos_token,
            eos_token,
        })
    }

    /// Renders `messages` followed by the generation prompt.
    ///
    /// `tools` is the tool list and the prompt introducing it, exposed to
    /// the template as `tools` and `tool_prompt`.
    pub fn apply(&self, messages: &[Message], tools: Option<(&[Value], &str)>) -> Result<String> {
        let template = self
            .env
            .get_template(NAME)
            .map_err(|e| Error::InternalEngine(e.to_string()))?;
        let (tools, tool_prompt) = tools.unzip();
        template
            .render(context! {
                messages => messages,
                tools => tools,
                tool_prompt => tool_prompt,
                add_generation_prompt => true,
                bos_token => self.bos_token.as_deref().unwrap_or_default(),
                eos_token => self.eos_token.as_deref().unwrap_or_default(),
            })
            .map_err(|e| Error::InvalidArgument(format!("chat template: {e}")))
    }
}

impl std::fmt::Debug for ChatTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTemplate")
            .field("bos_token", &self.bos_token)
            .field("eos_token", &self.eos_token)
            .finish_non_exhaustive()
    }
}

/// `raise_exception(msg)` as used by Hugging Face templates.
fn raise_exception(msg: String) -> std::result::Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, msg))
}
