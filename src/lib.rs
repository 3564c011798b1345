#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

#[path = "../forecast/mod.rs"]
pub mod forecast;

#[path = "../evaluate/mod.rs"]
pub mod evaluate;
