//! Ambient transactional envelopes.
//!
//! An envelope is the shared transactional context that Default-mode units
//! of work join. It is modelled as an explicit tree node rather than
//! thread-ambient state:
//!
//! - every participant holds an [`AmbientScope`] pointing at the envelope
//! - the envelope commits once every participant voted commit
//! - the first abort vote aborts it permanently
//! - backends learn the outcome through [`EnvelopeResource`]
//!
//! | Mode       | Enclosing envelope        | Result                     |
//! |------------|---------------------------|----------------------------|
//! | `Default`  | active or aborted         | joins it                   |
//! | `Default`  | committed                 | opens a new envelope       |
//! | `Default`  | none / suppressed         | opens a new envelope       |
//! | `New`      | any                       | opens a new envelope       |
//! | `Suppress` | any                       | no envelope                |

mod envelope;
mod scope;

pub use envelope::{Envelope, EnvelopeResource, EnvelopeStatus};
pub use scope::AmbientScope;
