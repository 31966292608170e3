pub mod endpoints;
pub mod middleware;
pub mod permissions;
pub mod rest;
pub mod security;
pub mod state;
