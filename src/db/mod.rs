mod postgres;

pub use postgres::PostgresPing;
