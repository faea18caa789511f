//! Hello world across two actors
//!
//! Loads `config/facility.toml` when present (`ACTORS_*` variables override
//! it), then has a front actor ask a greeter for a greeting and decorate it.
//!
//! ```text
//! RUST_LOG=actors=debug cargo run -p actors --example hello_world
//! ```

use actors::{ActorRef, Facility, FacilityConfig, Transport};
use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Greeter {
    greeting: &'static str,
}

struct Front {
    greeter: ActorRef<Greeter>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = FacilityConfig::load(None)?;
    let facility = Facility::new(config)?;

    let greeter = ActorRef::new(&facility.mailbox(), Greeter { greeting: "Hello" });
    let front = ActorRef::new(&facility.mailbox(), Front { greeter });

    let message = front
        .request(|state: &mut Front, mailbox, transport: Transport<String>| {
            state
                .greeter
                .request(|greeter: &mut Greeter, _, transport| {
                    transport.respond(format!("{} world", greeter.greeting))?;
                    Ok(())
                })
                .send(mailbox, move |greeting: String| {
                    transport.respond(format!("{}!", greeting))?;
                    Ok(())
                })?;
            Ok(())
        })
        .call()?;

    info!(%message, "Received greeting");
    println!("{}", message);

    facility.close();
    info!(metrics = ?facility.metrics().snapshot(), "Done");
    Ok(())
}
