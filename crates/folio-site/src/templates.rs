//! Template loading and slot validation.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use minijinja::{Environment, Value};
use regex::Regex;
use walkdir::WalkDir;

/// Variables every page template must reference.
pub const REQUIRED_SLOTS: &[&str] = &["title", "body"];

/// Template used when a document does not name one.
pub const DEFAULT_TEMPLATE: &str = "page.html";

/// Template rendered for the post listing, when present.
pub const LISTING_TEMPLATE: &str = "index.html";

/// Errors raised while loading templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("failed to walk template directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template `{name}`: {source}")]
    Syntax {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

/// A set of named templates, loaded once and shared read-only.
pub struct TemplateSet {
    env: Environment<'static>,
    sources: BTreeMap<String, String>,
    builtin: bool,
}

impl TemplateSet {
    /// The built-in theme, used when a site has no template directory.
    pub fn builtin() -> Self {
        let mut set = Self::from_sources([
            ("base.html", BASE_TEMPLATE),
            ("page.html", PAGE_TEMPLATE),
            ("index.html", INDEX_TEMPLATE),
        ])
        .expect("Failed to add built-in templates");
        set.builtin = true;
        set
    }

    /// Load every `*.html` file below `dir`, named by its path relative to `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, TemplateError> {
        if !dir.is_dir() {
            return Err(TemplateError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut sources = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("html")
            {
                continue;
            }

            let name = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = fs::read_to_string(path).map_err(|source| TemplateError::Read {
                path: path.to_path_buf(),
                source,
            })?;

            tracing::debug!("Loaded template {}", name);
            sources.push((name, source));
        }

        Self::from_sources(sources)
    }

    /// Build a set from `(name, source)` pairs.
    pub fn from_sources<N, S>(templates: impl IntoIterator<Item = (N, S)>) -> Result<Self, TemplateError>
    where
        N: Into<String>,
        S: Into<String>,
    {
        let mut env = Environment::new();
        let mut sources = BTreeMap::new();

        for (name, source) in templates {
            let name = name.into();
            let source = source.into();
            env.add_template_owned(name.clone(), source.clone())
                .map_err(|source| TemplateError::Syntax {
                    name: name.clone(),
                    source,
                })?;
            sources.insert(name, source);
        }

        Ok(Self {
            env,
            sources,
            builtin: false,
        })
    }

    /// Whether this is the built-in theme.
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Required slots the named template never references.
    ///
    /// Looks through the template and everything it extends, includes or
    /// imports by literal name.
    pub fn missing_slots(&self, name: &str) -> Result<Vec<&'static str>, minijinja::Error> {
        let referenced = self.referenced_variables(name)?;

        Ok(REQUIRED_SLOTS
            .iter()
            .copied()
            .filter(|slot| !referenced.contains(*slot))
            .collect())
    }

    /// Render the named template.
    pub fn render(&self, name: &str, context: Value) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(context)
    }

    fn referenced_variables(&self, name: &str) -> Result<HashSet<String>, minijinja::Error> {
        let mut variables = HashSet::new();
        let mut visited = HashSet::new();
        let mut pending = vec![name.to_string()];

        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }

            let template = self.env.get_template(&current)?;
            variables.extend(template.undeclared_variables(false));

            if let Some(source) = self.sources.get(&current) {
                pending.extend(
                    reference_pattern()
                        .captures_iter(source)
                        .map(|caps| caps[1].to_string()),
                );
            }
        }

        Ok(variables)
    }
}

impl std::fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSet")
            .field("templates", &self.sources.keys().collect::<Vec<_>>())
            .field("builtin", &self.builtin)
            .finish()
    }
}

/// `{% extends "x" %}`, `{% include 'x' %}`, `{% import "x" as y %}`, `{% from "x" import y %}`
fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\{%-?\s*(?:extends|include|import|from)\s+["']([^"']+)["']"#)
            .expect("template reference pattern is valid")
    })
}

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{% if title != site.title %}{{ title }} - {% endif %}{{ site.title }}</title>
  {% if description %}<meta name="description" content="{{ description }}">
  {% endif %}<link rel="stylesheet" href="{{ site.base_url }}style.css">
</head>
<body>
  <header class="site-header">
    <a href="{{ site.base_url }}" class="site-title">{{ site.title }}</a>
  </header>
  <main class="main">
    {% block content %}{% endblock %}
  </main>
</body>
</html>"##;

const PAGE_TEMPLATE: &str = r##"{% extends "base.html" %}

{% block content %}
<article class="post">
  <h1>{{ title }}</h1>
  {% if date %}<time datetime="{{ date }}">{{ date_formatted }}</time>{% endif %}
  {% if tags %}
  <ul class="tags">
  {% for tag in tags %}<li>{{ tag }}</li>{% endfor %}
  </ul>
  {% endif %}
  {% if toc | length > 2 %}
  <nav class="toc">
    <ul>
    {% for entry in toc %}
      <li class="toc-level-{{ entry.level }}"><a href="#{{ entry.id }}">{{ entry.title }}</a></li>
    {% endfor %}
    </ul>
  </nav>
  {% endif %}
  <div class="content">
    {{ body }}
  </div>
</article>
{% endblock %}"##;

const INDEX_TEMPLATE: &str = r##"{% extends "base.html" %}

{% block content %}
<section class="listing">
  <ul class="posts">
  {% for page in pages %}
    <li>
      {% if page.date %}<time datetime="{{ page.date }}">{{ page.date_formatted }}</time>{% endif %}
      <a href="{{ page.url }}">{{ page.title }}</a>
      {% if page.description %}<p>{{ page.description }}</p>{% endif %}
    </li>
  {% endfor %}
  </ul>
</section>
{% endblock %}"##;

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn builtin_page_has_required_slots() {
        let set = TemplateSet::builtin();

        assert!(set.is_builtin());
        assert_eq!(set.missing_slots("page.html").unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn reports_missing_body_slot() {
        let set = TemplateSet::from_sources([("page.html", "<h1>{{ title }}</h1>")]).unwrap();

        assert_eq!(set.missing_slots("page.html").unwrap(), vec!["body"]);
    }

    #[test]
    fn follows_extends_and_includes() {
        let set = TemplateSet::from_sources([
            ("base.html", "<title>{{ title }}</title>{% block main %}{% endblock %}"),
            ("body.html", "{{ body }}"),
            (
                "post.html",
                r#"{% extends "base.html" %}{% block main %}{% include 'body.html' %}{% endblock %}"#,
            ),
        ])
        .unwrap();

        assert_eq!(set.missing_slots("post.html").unwrap(), Vec::<&str>::new());
        assert_eq!(set.missing_slots("body.html").unwrap(), vec!["title"]);
    }

    #[test]
    fn loop_variables_are_not_slots() {
        let set = TemplateSet::from_sources([(
            "list.html",
            "{% for title in items %}{{ title }}{% endfor %}{{ body }}",
        )])
        .unwrap();

        assert_eq!(set.missing_slots("list.html").unwrap(), vec!["title"]);
    }

    #[test]
    fn rejects_invalid_syntax() {
        let result = TemplateSet::from_sources([("bad.html", "{% if %}")]);

        assert!(matches!(result, Err(TemplateError::Syntax { .. })));
    }

    #[test]
    fn loads_nested_directory() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("partials")).unwrap();
        fs::write(temp.path().join("page.html"), "{{ title }}{{ body }}").unwrap();
        fs::write(temp.path().join("partials/footer.html"), "<footer></footer>").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let set = TemplateSet::from_dir(temp.path()).unwrap();

        assert_eq!(
            set.names().collect::<Vec<_>>(),
            vec!["page.html", "partials/footer.html"]
        );
        assert!(!set.is_builtin());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempdir().unwrap();

        let result = TemplateSet::from_dir(&temp.path().join("nope"));

        assert!(matches!(result, Err(TemplateError::DirectoryNotFound(_))));
    }

    #[test]
    fn escapes_plain_strings_but_not_safe_ones() {
        let set = TemplateSet::from_sources([("page.html", "{{ title }}|{{ body }}")]).unwrap();

        let html = set
            .render(
                "page.html",
                context! {
                    title => "<b>",
                    body => Value::from_safe_string("<p>ok</p>".to_string()),
                },
            )
            .unwrap();

        assert_eq!(html, "&lt;b&gt;|<p>ok</p>");
    }
}
