mod e2e;
mod etl;
mod flights;
mod search;
mod utils;
