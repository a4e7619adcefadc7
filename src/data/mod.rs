pub use reader::OrderReader;

mod reader;
