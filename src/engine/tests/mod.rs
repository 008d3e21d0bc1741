mod basic;
mod teardown;
