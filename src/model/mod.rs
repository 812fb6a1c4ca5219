//! Core data model types for public_variable

mod coordinate;
mod document;
mod fragment;
mod id;

pub use coordinate::{
    fragment_key, root_key, Controller, Coordinate, FragmentCoordinate, FRAGMENT_FAMILY,
    ROOT_FAMILY,
};
pub use document::{Content, Document, Metadata};
pub use fragment::{
    route_content, value_content, Fragment, FragmentContent, RootDescriptor, MAX_TREE_DEPTH,
};
pub use id::DocumentId;
