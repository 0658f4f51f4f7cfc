pub mod dispatcher;
pub mod handler;
pub mod json_query;
pub mod listener;
pub mod params;
