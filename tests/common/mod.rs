#![allow(dead_code)]

pub mod graphql;
