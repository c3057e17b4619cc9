#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the depot crates.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! depot-derive = { path = "../derive" }
//! thiserror = "2"
//! ```
//!
//! The examples are `ignore`d because a proc-macro crate cannot use its own macros.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Turns an enum into a fully wired error type.
///
/// # Generated Items
///
/// * `#[derive(Debug, thiserror::Error)]` unless already derived.
/// * `<ErrorName>Ext` trait with `.context(...)` for `Result<T, ErrorName>` and for
///   `Result<T, SourceError>` of every variant that wraps a source.
/// * `From<SourceError>` for variants with a `source` field (or `#[source]`/`#[from]`).
/// * `From<&'static str>` and `From<String>` when an `Internal` variant exists.
/// * `variant_name()` returning the bare variant name for structured logs.
/// * A private `format_context` helper to render the optional context in messages.
///
/// # Requirements
///
/// 1. Only enums are accepted, and every variant must use named fields.
/// 2. Context-capable variants declare `context: Option<Cow<'static, str>>`.
/// 3. Variants wrapping a source must also carry a context field.
///
/// # Example
///
/// ```rust,ignore
/// use depot_derive::depot_error;
/// use std::borrow::Cow;
///
/// #[depot_error]
/// pub enum StorageError {
///     #[error("I/O failure{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn open(path: &str) -> Result<std::fs::File, StorageError> {
///     std::fs::File::open(path).context("Opening provider root")
/// }
/// ```
#[proc_macro_attribute]
pub fn depot_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}
