//! In-world line rendering from the configured templates.

use kinship_common::config::FormatsConfig;

/// Replace `{key}` placeholders in one pass over the template, so text
/// coming from values is never expanded. Unknown placeholders are left as-is.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut line = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        line.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                line.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                line.push('{');
                rest = &tail[1..];
            }
        }
    }
    line.push_str(rest);
    line
}

#[derive(Debug, Clone)]
pub struct LineFormats {
    formats: FormatsConfig,
}

impl LineFormats {
    pub fn new(formats: FormatsConfig) -> Self {
        Self { formats }
    }

    /// Append the web suffix to a name when the action came from the web.
    pub fn speaker(&self, name: &str, from_web: bool) -> String {
        if from_web {
            format!("{name}{}", self.formats.web_suffix)
        } else {
            name.to_string()
        }
    }

    pub fn private_message(&self, sender: &str, receiver: &str, message: &str) -> String {
        render(
            &self.formats.private_message,
            &[("sender", sender), ("receiver", receiver), ("message", message)],
        )
    }

    pub fn group_message(&self, group: &str, player: &str, message: &str) -> String {
        render(
            &self.formats.group_message,
            &[("group", group), ("player", player), ("message", message)],
        )
    }

    pub fn announcement(&self, group: &str, player: &str, message: &str) -> String {
        render(
            &self.formats.announcement,
            &[("group", group), ("player", player), ("message", message)],
        )
    }

    pub fn system(&self, group: &str, message: &str) -> String {
        render(&self.formats.system, &[("group", group), ("message", message)])
    }

    pub fn notice(&self, message: &str) -> String {
        render(&self.formats.notice, &[("message", message)])
    }
}
