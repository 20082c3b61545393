use std::sync::Arc;

use anyhow::{Context, Result};
use skycast::{CityDirectory, CityQuery, CityResolver, Coordinates, NwsClient, SkycastConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SkycastConfig::load().context("failed to load configuration")?;
    skycast::logging::init(&config.logging);

    let input = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if input.is_empty() {
        eprintln!("usage: skycast <city name | geonameid | lat,lon>");
        std::process::exit(2);
    }

    let directory = Arc::new(
        CityDirectory::load(&config.cities.data_dir)
            .await
            .context("failed to load the city dataset")?,
    );
    let resolver = CityResolver::new(Arc::clone(&directory));

    let query = if Coordinates::parse(&input).is_some() {
        CityQuery {
            coordinates: Some(input.clone()),
            ..CityQuery::default()
        }
    } else if input.chars().all(|c| c.is_ascii_digit()) {
        CityQuery {
            geonameid: Some(input.clone()),
            ..CityQuery::default()
        }
    } else {
        CityQuery {
            search_query: Some(input.clone()),
            ..CityQuery::default()
        }
    };

    let resolved = resolver.resolve(&query).await;
    for warning in &resolved.warnings {
        eprintln!("warning: {warning}");
    }
    let Some(city) = resolved.cities.first() else {
        println!("No matching city for \"{input}\"");
        return Ok(());
    };

    println!(
        "Matched: {}, {} ({})",
        city.city_name, city.state_code, city.geonameid
    );
    for other in resolved.cities.iter().skip(1) {
        println!("   also: {}, {}", other.city_name, other.state_code);
    }

    let nws = NwsClient::new(&config.nws, &config.user_agent)?;
    let coordinates = city.coordinates();

    match nws.current(coordinates).await {
        Ok(entry) => {
            let properties = &entry.item.properties;
            if let Some(description) = &properties.text_description {
                println!("Currently: {description}");
            }
            if let Some(celsius) = properties.temperature.value {
                println!("Temperature: {celsius:.1} °C");
            }
        }
        Err(err) => eprintln!("current conditions unavailable: {err}"),
    }

    let points = nws.points(coordinates).await?;
    let forecast = nws.summary_forecast(&points).await?;
    match &forecast.item {
        Some(forecast) => {
            for period in forecast.properties.periods.iter().take(4) {
                println!("{}: {}", period.name, period.short_forecast);
            }
        }
        None => println!("Forecast unavailable"),
    }

    Ok(())
}
