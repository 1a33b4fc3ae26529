use std::fmt;

use handlebars::Handlebars;
use herald_common::send::{MessageContent, SendRequest};

use crate::ActivityError;

/// Final subject and bodies, ready for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedContent {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// Renders template content. A variable missing from the request is an error
/// rather than an empty string.
#[derive(Clone)]
pub struct ContentRenderer {
    html: Handlebars<'static>,
    plain: Handlebars<'static>,
}

impl fmt::Debug for ContentRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentRenderer").finish_non_exhaustive()
    }
}

impl Default for ContentRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRenderer {
    #[must_use]
    pub fn new() -> Self {
        let mut html = Handlebars::new();
        html.set_strict_mode(true);

        let mut plain = Handlebars::new();
        plain.set_strict_mode(true);
        plain.register_escape_fn(handlebars::no_escape);

        Self { html, plain }
    }

    /// Render the request's content.
    ///
    /// # Errors
    ///
    /// [`ActivityError::Validation`] if a template does not parse or refers
    /// to a variable the request does not carry.
    pub fn prepare(&self, request: &SendRequest) -> Result<PreparedContent, ActivityError> {
        match &request.content {
            MessageContent::Rendered { html, text } => Ok(PreparedContent {
                subject: request.subject.clone(),
                html: html.clone(),
                text: text.clone(),
            }),
            MessageContent::Template {
                html,
                text,
                variables,
            } => {
                let render = |registry: &Handlebars<'static>, field: &str, template: &str| {
                    registry
                        .render_template(template, variables)
                        .map_err(|e| ActivityError::Validation(format!("Cannot render {field}: {e}")))
                };

                Ok(PreparedContent {
                    subject: render(&self.plain, "subject", &request.subject)?,
                    html: render(&self.html, "html", html)?,
                    text: text
                        .as_deref()
                        .map(|text| render(&self.plain, "text", text))
                        .transpose()?,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use herald_common::{
        ids::{SendId, TenantId},
        send::Priority,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn request(subject: &str, content: MessageContent) -> SendRequest {
        SendRequest {
            id: SendId::new("s1"),
            tenant: TenantId::new("t1"),
            to: "user@example.com".to_string(),
            from: None,
            subject: subject.to_string(),
            content,
            scheduled_for: None,
            priority: Priority::Normal,
            tags: Vec::new(),
        }
    }

    fn template(html: &str, text: Option<&str>, variables: &[(&str, &str)]) -> MessageContent {
        MessageContent::Template {
            html: html.to_string(),
            text: text.map(ToString::to_string),
            variables: variables
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_rendered_content_passes_through() {
        let prepared = ContentRenderer::new()
            .prepare(&request("Hi {{name}}", MessageContent::rendered("<p>Hi</p>")))
            .unwrap();

        assert_eq!(prepared.subject, "Hi {{name}}");
        assert_eq!(prepared.html, "<p>Hi</p>");
        assert_eq!(prepared.text, None);
    }

    #[test]
    fn test_template_is_rendered() {
        let prepared = ContentRenderer::new()
            .prepare(&request(
                "Welcome, {{name}}",
                template(
                    "<p>Hello {{name}}</p>",
                    Some("Hello {{name}}"),
                    &[("name", "Ann & Bob")],
                ),
            ))
            .unwrap();

        assert_eq!(prepared.subject, "Welcome, Ann & Bob");
        assert_eq!(prepared.html, "<p>Hello Ann &amp; Bob</p>");
        assert_eq!(prepared.text.as_deref(), Some("Hello Ann & Bob"));
    }

    #[test]
    fn test_missing_variable_is_validation_error() {
        let err = ContentRenderer::new()
            .prepare(&request("Hi", template("<p>{{missing}}</p>", None, &[])))
            .unwrap_err();

        assert!(matches!(err, ActivityError::Validation(_)), "{err}");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_broken_template_is_validation_error() {
        let err = ContentRenderer::new()
            .prepare(&request("Hi", template("<p>{{#if}}</p>", None, &[])))
            .unwrap_err();

        assert!(matches!(err, ActivityError::Validation(_)));
    }
}
