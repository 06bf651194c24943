mod helpers;
mod open_tests;
mod worker_tests;
