//! Save and load the text formats used by the CP2K electronic-structure code:
//! Gaussian basis sets (`BASIS_SET` files) and Goedecker-Teter-Hutter
//! pseudopotentials (`GTH_POTENTIALS` files). Both grammars are positional;
//! there is no schema tag, so the number and width of the lines in an entry
//! follow from counts read earlier in the same entry.
//!
//! Also provides an ingestion coordinator for reconciling freshly parsed
//! entries against an external record store under configurable duplicate
//! policies. Persistence itself is out of scope: this crate decides what to
//! store, not how.

pub mod basis_set;
mod error;
pub mod ingest;
mod parse;
pub mod pseudopotential;

pub use basis_set::*;
pub use error::{Cp2kFileError, Result};
pub use ingest::*;
pub use parse::{EntryIter, FloatFormat, is_blank_or_comment, match_header};
pub use pseudopotential::*;
