//! Load an XML file, query it with XPath and edit it in place.
//!
//! [`DocumentSession`] binds a [`Document`] to a file path. Queries return matched
//! nodes in document order, and every mutation applies to all matched nodes at once.
//! With autosave on, each successful mutation is written straight back to disk.
//!
//! ```no_run
//! use xml_session::DocumentSession;
//!
//! let mut session = DocumentSession::open("fruits.xml", true)?;
//! session.add_child("/document/fruits", "fruit", Some("Kiwi"), None)?;
//! session.remove("/document/vegetables/*", None)?;
//! for fruit in session.query("//fruit", None)? {
//!     println!("{}", session.value(&fruit));
//! }
//! # Ok::<(), xml_session::Error>(())
//! ```
//!
//! The tree itself can be used without a session, see [`Document`] and [`Node`].

mod document;
mod error;
mod node;
mod parser;
mod session;
mod xpath;

pub use crate::document::{Document, WriteOptions};
pub use crate::error::{Error, Result};
pub use crate::node::{Node, NodeKind};
pub use crate::parser::ReadOptions;
pub use crate::session::{DocumentSession, SessionOptions};
pub use crate::xpath::{NodeRef, QueryEngine, Value, XPathEngine};
