//! Markdown to HTML rendering.
//!
//! GitHub-flavoured markdown is parsed with Comrak; fenced code blocks are
//! replaced by Syntect class-based highlighting before the tree is
//! formatted. Raw HTML in posts is passed through.

mod highlight;

use comrak::{
    Arena, format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    options::{ListStyleType, Options},
    parse_document,
};
use syntect::{dumps::from_uncompressed_data, parsing::SyntaxSet};
use thiserror::Error;

pub use highlight::highlight_css;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markdown formatting failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("embedded syntax pack is unreadable: {message}")]
    SyntaxPack { message: String },
    #[error("unknown highlight theme `{theme}` (available: {available})")]
    Theme { theme: String, available: String },
}

/// Converts a markdown body to HTML.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Comrak-based renderer with Syntect highlighting emitting `syntax-`
/// prefixed CSS classes.
pub struct ComrakRenderer {
    options: Options<'static>,
    syntax_set: SyntaxSet,
}

impl ComrakRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let syntax_bytes = include_bytes!(env!("SYNTAX_PACK_FILE"));
        let syntax_set: SyntaxSet =
            from_uncompressed_data(syntax_bytes).map_err(|err| RenderError::SyntaxPack {
                message: err.to_string(),
            })?;

        Ok(Self {
            options: default_options(),
            syntax_set,
        })
    }

    fn highlight_blocks(&self, node: &AstNode<'_>) -> Result<(), RenderError> {
        if let Some((info, literal)) = extract_code_block(node) {
            let mut segments = info.split_whitespace();
            let language = segments.next();
            let meta = segments.collect::<Vec<_>>().join(" ");
            let meta = (!meta.is_empty()).then_some(meta.as_str());

            let html = highlight::highlight_code(language, meta, &literal, &self.syntax_set)?;
            let mut data = node.data.borrow_mut();
            data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                block_type: 0,
                literal: html,
            });
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            self.highlight_blocks(next)?;
            child = next.next_sibling();
        }

        Ok(())
    }
}

impl MarkdownRenderer for ComrakRenderer {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        self.highlight_blocks(root)?;

        let mut html = String::new();
        format_html(root, &self.options, &mut html).map_err(|err| RenderError::Markdown {
            message: err.to_string(),
        })?;
        Ok(html)
    }
}

fn extract_code_block(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    if let NodeValue::CodeBlock(block) = &data.value {
        Some((block.info.trim().to_string(), block.literal.clone()))
    } else {
        None
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.description_lists = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.full_info_string = true;
    render.tasklist_classes = true;
    render.list_style = ListStyleType::Dash;
    render.r#unsafe = true;
    render.gfm_quirks = true;

    options
}
