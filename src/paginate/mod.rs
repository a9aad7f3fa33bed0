//! Pagination engine.
//!
//! A book's navigation entries are resolved lazily, in reading order, to
//! byte spans of their documents' bodies. Spans longer than the configured
//! budget are cut at markup-safe points; the overflow becomes a
//! continuation entry inserted right after the one it was split from.
//!
//! The pieces, bottom-up:
//!
//! - [`tags`]: per-document index of matched open/close tag offsets
//! - [`trim`]: where to cut a span without splitting a tag or a table
//! - [`closure`]: closers for elements a cut leaves open, reopeners for the next chunk
//! - [`nav`]: the navigation list and stable entry ids
//! - [`anchor`]: anchor spans, inversion repair and missing-anchor recovery
//! - [`post`], [`css`]: rewriting of a finished chunk
//! - [`section`]: the [`Paginator`] tying it together

pub mod anchor;
pub mod closure;
pub mod css;
pub mod nav;
pub mod post;
pub mod section;
pub mod tags;
pub mod trim;

pub use closure::OpenTag;
pub use nav::{EntryId, EntryKind, NavPoint, Navigation};
pub use section::{CacheStats, Paginator, Section};
pub use tags::{TagIndex, TagRecord};
