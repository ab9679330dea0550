//! Element references: ranked selector generation at capture time and
//! resolution with a visibility wait at replay time.

pub mod escape;
pub mod generate;
pub mod resolver;

pub use escape::{css_escape, css_string, xpath_literal};
pub use generate::{candidate_selectors, generate_target, is_stable_id, ElementDescriptor, PathSegment};
pub use resolver::{Resolution, Resolved, SelectorResolver};
