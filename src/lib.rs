//! Loading, summarizing and plotting of patient inflammation data sets.
//!
//! Each data set is an inflammation table read from a CSV or JSON file, with
//! one row per patient and one column per day.

pub mod compute_data;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod views;
