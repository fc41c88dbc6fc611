pub mod collection;