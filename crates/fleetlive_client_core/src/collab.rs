//! Seams for services that live outside the streaming client.

use std::future::Future;
use std::pin::Pin;

use fleetlive_domain::SingleDeviceRecord;
use tracing::warn;

pub type GeocodeFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;

/// Turns coordinates into a human-readable address.
pub trait ReverseGeocoder: Send + Sync {
	fn reverse<'a>(&'a self, latitude: f64, longitude: f64) -> GeocodeFuture<'a>;
}

/// Coordinates of a tracked device, if the record carries them.
pub fn device_position(record: &SingleDeviceRecord) -> Option<(f64, f64)> {
	let lat = record.number("latitude")?;
	let lng = record.number("longitude")?;
	(lat.is_finite() && lng.is_finite()).then_some((lat, lng))
}

/// Address for a device's last position. Falls back to raw coordinates when
/// the geocoder fails; `None` when the record has no position.
pub async fn describe_location(geocoder: &dyn ReverseGeocoder, record: &SingleDeviceRecord) -> Option<String> {
	let (lat, lng) = device_position(record)?;
	match geocoder.reverse(lat, lng).await {
		Ok(address) if !address.trim().is_empty() => Some(address),
		Ok(_) => Some(format!("{lat:.5}, {lng:.5}")),
		Err(e) => {
			warn!(device = %record.key, error = %e, "reverse geocoding failed");
			Some(format!("{lat:.5}, {lng:.5}"))
		}
	}
}

#[cfg(test)]
mod tests {
	use fleetlive_domain::DeviceKey;
	use serde_json::json;

	use super::*;

	struct Fixed(Option<&'static str>);

	impl ReverseGeocoder for Fixed {
		fn reverse<'a>(&'a self, _latitude: f64, _longitude: f64) -> GeocodeFuture<'a> {
			Box::pin(async move {
				self.0
					.map(str::to_string)
					.ok_or_else(|| anyhow::anyhow!("quota exceeded"))
			})
		}
	}

	fn record(v: serde_json::Value) -> SingleDeviceRecord {
		SingleDeviceRecord::new(DeviceKey::new("7").unwrap(), v.as_object().cloned().unwrap())
	}

	#[tokio::test]
	async fn uses_geocoder_and_falls_back_to_coordinates() {
		let rec = record(json!({"latitude": 12.5, "longitude": 77.25}));
		assert_eq!(
			describe_location(&Fixed(Some("MG Road")), &rec).await.as_deref(),
			Some("MG Road")
		);
		assert_eq!(
			describe_location(&Fixed(None), &rec).await.as_deref(),
			Some("12.50000, 77.25000")
		);
	}

	#[tokio::test]
	async fn records_without_position_have_no_location() {
		let rec = record(json!({"speed": 3}));
		assert_eq!(describe_location(&Fixed(Some("x")), &rec).await, None);
	}
}
