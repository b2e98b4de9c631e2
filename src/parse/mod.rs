pub mod board_parser;
pub mod board_serializer;
pub mod fields;
pub mod span;

pub use board_parser::parse_board;
pub use board_serializer::rebuild;
