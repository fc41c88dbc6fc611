#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use relkv::core::config::Config;
use relkv::core::store::StoreManager;
use relkv::core::types::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t1: String,
    pub val: i32,
}
impl Record for Sample {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub age: u32,
}
impl Record for User {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
}
impl Record for Post {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
}
impl Record for Tag {}

pub fn sample(t1: &str, val: i32) -> Sample {
    Sample { t1: t1.to_string(), val }
}

pub fn user(name: &str, age: u32) -> User {
    User { name: name.to_string(), age }
}

pub fn post(title: &str) -> Post {
    Post { title: title.to_string() }
}

pub fn store() -> StoreManager {
    StoreManager::in_memory(Config::default())
}

pub fn store_with_buffer(size: usize) -> StoreManager {
    StoreManager::in_memory(Config::default().with_id_buffer_size(size))
}
