// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reads through a store twice: the first read dispatches a fetch, the
//! second is served from cache.

use std::time::Duration;

use freshet::Store;
use tick::Clock;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let clock = Clock::new_tokio();
    let store = Store::builder(clock, |breed: String| async move {
        Ok::<_, std::io::Error>(format!("https://images.dog.ceo/{breed}"))
    })
    .fresh_age(Duration::from_secs(2))
    .stale_age(Duration::from_secs(30))
    .build();

    let first = store.get(&"shiba".to_string());
    println!("first read is pending: {}", first.is_pending());

    let url = first.data().await.expect("fetch failed");
    println!("fetched: {url}");

    let second = store.get(&"shiba".to_string());
    println!("second read from cache: {:?}", second.success());
}
