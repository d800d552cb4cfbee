pub mod agent;
pub mod gateway;
pub mod history;
pub mod onboard;
pub mod tools;
