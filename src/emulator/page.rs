//! The page a script host boots from.
//!
//! A page is HTML-ish markup whose `<script>` elements are evaluated in document order. Inline
//! bodies are taken verbatim; `src` attributes are resolved against the directory of the page
//! file. Everything else on the page is ignored; there is no DOM.

use std::{
    fs,
    path::{Path, PathBuf},
};

use quick_xml::{events::Event, Reader};

use crate::{Error, Result};

/// Where a page comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// Inline page content
    Content(String),
    /// A local file
    File(PathBuf),
    /// A URL; only `file://` URLs are supported
    Url(String),
}

impl PageSource {
    /// Reads the page content and the directory relative `src` paths resolve against.
    ///
    /// # Errors
    /// - [`Error::FileError`] if the page file cannot be read
    /// - [`Error::NotSupported`] for non-`file` URLs
    pub fn read(&self) -> Result<(String, Option<PathBuf>)> {
        match self {
            PageSource::Content(content) => Ok((content.clone(), None)),
            PageSource::File(path) => read_file(path),
            PageSource::Url(url) => match url.strip_prefix("file://") {
                Some(path) => read_file(Path::new(path)),
                None => Err(Error::NotSupported(format!(
                    "Only file:// pages can be loaded, not {}",
                    url
                ))),
            },
        }
    }
}

fn read_file(path: &Path) -> Result<(String, Option<PathBuf>)> {
    let content = fs::read_to_string(path)?;
    Ok((content, path.parent().map(Path::to_path_buf)))
}

/// One script of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageScript {
    /// Name used in script stack traces
    pub origin: String,
    /// The script source
    pub source: String,
}

/// Extracts the scripts of `content` in document order.
///
/// # Errors
/// - [`Error::Boot`] if the markup cannot be tokenized
/// - [`Error::FileError`] if a `src` script cannot be read
pub fn extract_scripts(content: &str, base: Option<&Path>) -> Result<Vec<PageScript>> {
    let mut rest = content;
    let mut reader = markup_reader(rest);

    let mut scripts = Vec::new();
    loop {
        let (start, has_body) = match reader.read_event()? {
            Event::Start(start) => (start, true),
            Event::Empty(start) => (start, false),
            Event::Eof => break,
            _ => continue,
        };
        if !start.name().as_ref().eq_ignore_ascii_case(b"script") {
            continue;
        }

        let mut src = None;
        for attribute in start.html_attributes() {
            let attribute = attribute.map_err(|e| Error::Boot(format!("bad script attribute: {}", e)))?;
            if attribute.key.as_ref().eq_ignore_ascii_case(b"src") {
                src = Some(attribute.unescape_value()?.into_owned());
            }
        }

        // script bodies are raw text up to the closing tag, never markup
        let body = if has_body {
            let after_tag = usize::try_from(reader.buffer_position())
                .ok()
                .and_then(|offset| rest.get(offset..))
                .ok_or_else(|| Error::Boot("page could not be read past a <script> tag".to_string()))?;
            let (body, resume) = raw_script_body(after_tag)?;
            let body = body.to_string();
            rest = &after_tag[resume..];
            reader = markup_reader(rest);
            body
        } else {
            String::new()
        };

        match src {
            Some(src) => match base {
                Some(base) => {
                    let path = base.join(&src);
                    scripts.push(PageScript {
                        origin: path.display().to_string(),
                        source: fs::read_to_string(&path)?,
                    });
                }
                None => log::warn!("skipping script {:?}: inline pages cannot reference files", src),
            },
            None if !body.trim().is_empty() => scripts.push(PageScript {
                origin: format!("<script #{}>", scripts.len()),
                source: body,
            }),
            None => {}
        }
    }

    Ok(scripts)
}

fn markup_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

/// Splits `text`, which follows a `<script>` start tag, into the script body and the offset
/// just past the matching close tag.
fn raw_script_body(text: &str) -> Result<(&str, usize)> {
    const CLOSE: &[u8] = b"</script";

    let end = text
        .as_bytes()
        .windows(CLOSE.len())
        .position(|window| window.eq_ignore_ascii_case(CLOSE))
        .ok_or_else(|| Error::Boot("page could not be read: unterminated <script>".to_string()))?;
    let resume = text[end..]
        .find('>')
        .map_or(text.len(), |close| end + close + 1);
    Ok((&text[..end], resume))
}
