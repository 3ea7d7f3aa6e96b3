// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Self-hosted, plain text API documentation.

use std::fmt;

use itertools::Itertools as _;

use crate::{Mounts, VERSION};

/// Shorthands for the curl command lines used in examples.
const CURL_SUBSTITUTIONS: &[(&str, &str)] = &[
    (
        "get",
        "curl -X GET -G -s -w '\\nHTTP: %{http_code}\\nContent-type: %{content_type}'",
    ),
    ("get_i", "curl -X GET -G -si"),
    (
        "post",
        "curl -X POST -s -w '\\nHTTP: %{http_code}\\nContent-type: %{content_type}'",
    ),
    ("post_i", "curl -X POST -si"),
    (
        "put",
        "curl -X PUT -s -w '\\nHTTP: %{http_code}\\nContent-type: %{content_type}'",
    ),
    ("put_i", "curl -X PUT -si"),
    (
        "delete",
        "curl -X DELETE -s -w '\\nHTTP: %{http_code}\\nContent-type: %{content_type}'",
    ),
    ("delete_i", "curl -X DELETE -si"),
    ("head", "curl -s -I"),
];

#[derive(Debug)]
pub struct EndpointDoc {
    pub name: &'static str,
    pub text: &'static str,
}

#[derive(Debug)]
pub struct ModuleDoc {
    pub module: &'static str,
    pub description: &'static str,
    pub endpoints: &'static [EndpointDoc],
}

/// Replaces `${name}` placeholders.
///
/// Unknown placeholders are left untouched.
#[must_use]
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let placeholder = &rest[start..];
        let value = placeholder.find('}').and_then(|end| {
            let name = &placeholder[2..end];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (*value, end + 1))
        });
        if let Some((value, len)) = value {
            output.push_str(value);
            rest = &placeholder[len..];
        } else {
            output.push_str("${");
            rest = &placeholder[2..];
        }
    }
    output.push_str(rest);
    output
}

fn underline(text: &str, ch: char) -> String {
    ch.to_string().repeat(text.chars().count())
}

/// Documentation text of a module before substitution.
struct DocsText<'a> {
    doc: &'a ModuleDoc,
    mounts: Option<&'a Mounts>,
}

impl fmt::Display for DocsText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { doc, mounts } = self;
        let ModuleDoc {
            module,
            description,
            endpoints,
        } = doc;

        let rule = underline(module, '=');
        write!(f, "\n{rule}\n{module}\n{rule}\n{description}\n")?;

        if let Some(mounts) = mounts.filter(|mounts| !mounts.is_empty()) {
            let heading = "Mounted Applications";
            write!(f, "\n{heading}\n{}\n\n", underline(heading, '-'))?;
            for (prefix, app) in mounts {
                writeln!(
                    f,
                    " * `{module} <${{server_url}}{prefix}/__doc__>`_",
                    module = app.doc().module
                )?;
            }
        }

        let heading = "Document strings for this module";
        write!(f, "\n{heading}\n{}\n\n", underline(heading, '-'))?;
        let endpoints = endpoints
            .iter()
            .sorted_by_key(|endpoint| endpoint.name)
            .collect::<Vec<_>>();
        for EndpointDoc { name, .. } in &endpoints {
            writeln!(f, " * `{name}()`_")?;
        }
        for EndpointDoc { name, text } in &endpoints {
            let title = format!("{name}()");
            write!(f, "\n{title}\n{}\n{text}\n", underline(&title, '~'))?;
        }
        Ok(())
    }
}

/// Renders the documentation of a module.
///
/// Mounted applications are only listed for the root module.
#[must_use]
pub fn build_docs(doc: &ModuleDoc, mounts: Option<&Mounts>, server_url: &str) -> String {
    let text = DocsText { doc, mounts }.to_string();
    let mut vars = vec![("server_url", server_url), ("server_version", VERSION)];
    vars.extend_from_slice(CURL_SUBSTITUTIONS);
    substitute(&text, &vars)
}
