extern crate dotenv;

use dotenv::dotenv;
use std::env;
use std::error::Error;
use std::time::Duration;

use calbot::calendar::{EventSource, IcsEventSource, UserConfig};
use calbot::formatting;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv().ok();

    let url = env::args()
        .nth(1)
        .ok_or("usage: calendar-example <feed url>")?;

    let source = IcsEventSource::new(Duration::from_secs(30), chrono::Duration::days(30))?;
    let calendar = source.fetch_events(&url).await?;
    let user = UserConfig::default();

    println!(
        "{} ({} upcoming events)",
        calendar.name.as_deref().unwrap_or(&url),
        calendar.events.len()
    );

    for event in &calendar.events {
        println!("\n--- {} at {}", event.id, event.start);
        println!(
            "{}",
            formatting::render(&user.format, &user.language, event)?
        );
    }

    Ok(())
}
