pub mod commands;
pub mod pipeline;
pub mod reader;

pub use commands::{MoviePatch, NewMovie, Patch};
pub use pipeline::MovieWriter;
pub use reader::{MovieOrder, MoviePage, MovieQuery, MovieReader, hydrate};
