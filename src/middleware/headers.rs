use anyhow::bail;

use super::Middleware;
use crate::dispatcher::{HandlerRequest, HandlerResponse};
use crate::pipeline::Next;

/// Sets a fixed header on every response, e.g. `header:cache-control,no-store`.
///
/// An existing header with the same name is replaced.
#[derive(Debug, Clone)]
pub struct ResponseHeaderMiddleware {
    name: String,
    value: String,
}

impl ResponseHeaderMiddleware {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Build from entry arguments `[name, value...]`; extra arguments are
    /// joined back with `,` so values may contain commas.
    pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
        match args {
            [name, value @ ..] if !name.is_empty() && !value.is_empty() => {
                Ok(Self::new(name.to_ascii_lowercase(), value.join(",")))
            }
            _ => bail!("expected arguments 'name,value', got {:?}", args),
        }
    }
}

impl Middleware for ResponseHeaderMiddleware {
    fn handle(&self, req: HandlerRequest, next: Next<'_>) -> anyhow::Result<HandlerResponse> {
        let mut res = next.run(req)?;
        res.set_header(&self.name, self.value.clone());
        Ok(res)
    }

    fn name(&self) -> &str {
        "header"
    }
}
