//! Initialize a new site

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const CONFIG: &str = r#"# Site
title: Pressmark
subtitle: ''
description: ''
author: John Doe
language: en
# IANA time zone for dates written without an offset (default UTC)
timezone: ''

# URL
url: http://example.com
root: /
permalink: :year/:month/:day/:title/

# Directory
source_dir: source
public_dir: public
tag_dir: tags
archive_dir: archives
category_dir: categories

# Writing
render_drafts: false
external_link:
  enable: true
  exclude: []
highlight:
  enable: true
  line_number: true
  theme: base16-ocean.dark

# Date format (strftime)
date_format: '%Y-%m-%d'

# Pagination
per_page: 10
pagination_dir: page

# Feed
feed_limit: 20
"#;

const HELLO_WORLD: &str = r#"---
title: Hello World
date: 2024-01-01 00:00:00
tags: [welcome]
categories: General
---
Welcome to **pressmark**! This is your very first post.

<!-- more -->

## Quick Start

Create a new post:

```bash
$ pressmark new "My New Post"
```

Build the site into `public/`:

```bash
$ pressmark build
```
"#;

/// Scaffold a site in `target_dir`. Existing files are left untouched.
pub fn init_site(target_dir: &Path) -> Result<()> {
    for dir in ["source/_posts", "source/_drafts"] {
        let path = target_dir.join(dir);
        fs::create_dir_all(&path).with_context(|| format!("Failed to create {:?}", path))?;
    }

    write_new(&target_dir.join("_config.yml"), CONFIG)?;
    write_new(
        &target_dir.join("source/_posts/hello-world.md"),
        HELLO_WORLD,
    )?;

    Ok(())
}

fn write_new(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        tracing::warn!("{:?} already exists, skipping", path);
        return Ok(());
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
}
