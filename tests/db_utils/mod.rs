mod test_db;

pub use test_db::TestDB;
