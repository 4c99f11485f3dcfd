//! Initialize a new site in the current directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use folio_site::AssetPipeline;

/// Run the init command.
pub async fn run(yes: bool) -> Result<()> {
    tracing::info!("Initializing folio site...");

    let created = scaffold(Path::new("."), yes)?;
    if created.is_empty() {
        return Ok(());
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'folio build' to build the site, or 'folio watch' to rebuild on change.");

    Ok(())
}

/// Write the starter files below `root`, returning the paths written.
///
/// Existing files are left alone unless `overwrite` is set.
fn scaffold(root: &Path, overwrite: bool) -> Result<Vec<PathBuf>> {
    let content_dir = root.join("content");
    if content_dir.exists() && !overwrite {
        tracing::warn!("content/ directory already exists. Use --yes to overwrite.");
        return Ok(Vec::new());
    }

    let files = [
        ("folio.toml", DEFAULT_CONFIG),
        ("templates/page.html", DEFAULT_PAGE_TEMPLATE),
        ("templates/index.html", DEFAULT_INDEX_TEMPLATE),
        ("static/style.css", AssetPipeline::default_css()),
        ("content/posts/hello.md", DEFAULT_POST),
        ("content/drafts/ideas.md", DEFAULT_DRAFT),
    ];

    let mut created = Vec::new();
    for (relative, contents) in files {
        let path = root.join(relative);
        if path.exists() && !overwrite {
            tracing::debug!("Keeping existing {}", relative);
            continue;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", relative))?;
        tracing::info!("Created {}", relative);
        created.push(path);
    }

    Ok(created)
}

const DEFAULT_CONFIG: &str = r#"# folio configuration

[site]
# Site title, available to templates as site.title
title = "My Notes"

# Base URL (for deployment). sitemap.xml is only written for an absolute
# URL such as "https://example.com/"
base_url = "/"

[build]
content = "content"
output = "public"
templates = "templates"
static = "static"

# Template for documents that do not set `template`
default_template = "page.html"

# Write posts/hello/index.html instead of posts/hello.html
pretty_urls = false

# Render documents marked `draft = true`
drafts = false

date_format = "%B %e, %Y"
sitemap = true
search_index = true

[markdown]
extensions = ["tables", "footnotes", "strikethrough", "tasklists"]
"#;

const DEFAULT_PAGE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }} - {{ site.title }}</title>
  <link rel="stylesheet" href="{{ site.base_url }}style.css">
</head>
<body>
  <header class="site-header">
    <a href="{{ site.base_url }}" class="site-title">{{ site.title }}</a>
  </header>
  <main class="main">
    <article class="post">
      <h1>{{ title }}</h1>
      {% if date %}<time datetime="{{ date }}">{{ date_formatted }}</time>{% endif %}
      {{ body }}
    </article>
  </main>
</body>
</html>
"##;

const DEFAULT_INDEX_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ site.title }}</title>
  <link rel="stylesheet" href="{{ site.base_url }}style.css">
</head>
<body>
  <header class="site-header">
    <span class="site-title">{{ site.title }}</span>
  </header>
  <main class="main">
    <ul class="posts">
    {% for page in pages %}
      <li>
        <a href="{{ page.url }}">{{ page.title }}</a>
        {% if page.date %}<time datetime="{{ page.date }}">{{ page.date_formatted }}</time>{% endif %}
      </li>
    {% endfor %}
    </ul>
  </main>
</body>
</html>
"##;

const DEFAULT_POST: &str = r#"+++
title = "Hello, folio"
date = 2025-01-01T00:00:00Z
draft = false
tags = ["meta"]
description = "The first post."
+++

Welcome to your new site. Every Markdown file under `content/` becomes a page.

## Front matter

Each post starts with a `+++` block of TOML (or a `---` block of YAML):

| key         | meaning                                   |
|-------------|-------------------------------------------|
| `title`     | page title, required                      |
| `date`      | publication date, used to order the index |
| `draft`     | left out of the build unless `--drafts`   |
| `template`  | template to render with                   |

## Next steps

- [x] Run `folio init`
- [ ] Edit `templates/page.html`
- [ ] Write a second post
"#;

const DEFAULT_DRAFT: &str = r#"+++
title = "Ideas"
draft = true
+++

Drafts are skipped unless you build with `--drafts`.
"#;
