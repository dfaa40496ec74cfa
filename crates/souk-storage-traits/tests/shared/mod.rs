//! Shared storage behaviour tests, run against every backend

#![allow(dead_code)]

pub mod conversation_tests;
pub mod message_tests;
