use anyhow::Context;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::json;

use super::{CalendarProvider, MirroredEvent, NewEvent};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const EVENT_SOURCE: &str = "salonbook";

/// Google Calendar v3 over REST with a pre-issued OAuth access token.
pub struct GoogleCalendar {
    calendar_id: String,
    access_token: String,
    client: reqwest::Client,
}

impl GoogleCalendar {
    pub fn new(calendar_id: String, access_token: String) -> Self {
        Self {
            calendar_id,
            access_token,
            client: reqwest::Client::new(),
        }
    }

    fn events_url(&self, event_id: Option<&str>) -> anyhow::Result<Url> {
        let mut url = Url::parse(API_BASE).context("invalid calendar API base")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("calendar API base cannot hold a path"))?;
            segments.extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn list(&self, query: &[(&str, String)]) -> anyhow::Result<Vec<MirroredEvent>> {
        let resp = self
            .client
            .get(self.events_url(None)?)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .context("failed to list Google Calendar events")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Google Calendar response")?;

        if !status.is_success() {
            anyhow::bail!("Google Calendar API error ({}): {}", status, data);
        }

        Ok(parse_events(&data))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn find_by_booking_id(&self, booking_id: &str) -> anyhow::Result<Vec<MirroredEvent>> {
        self.list(&[
            ("privateExtendedProperty", format!("bookingId={booking_id}")),
            ("maxResults", "10".to_string()),
        ])
        .await
    }

    async fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<MirroredEvent>> {
        self.list(&[("maxResults", limit.to_string())]).await
    }

    async fn insert(&self, event: &NewEvent) -> anyhow::Result<String> {
        let body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": event.start.to_rfc3339() },
            "end": { "dateTime": event.end.to_rfc3339() },
            "colorId": event.color_id,
            "extendedProperties": {
                "private": {
                    "bookingId": event.booking_id,
                    "source": EVENT_SOURCE,
                }
            },
        });

        let resp = self
            .client
            .post(self.events_url(None)?)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to insert Google Calendar event")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Google Calendar response")?;

        if !status.is_success() {
            anyhow::bail!("Google Calendar API error ({}): {}", status, data);
        }

        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing id in Google Calendar response"))
    }

    async fn delete(&self, event_id: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .delete(self.events_url(Some(event_id))?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("failed to delete Google Calendar event")?;

        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!(event_id, "event already deleted");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            status => anyhow::bail!("Google Calendar API error ({status}) deleting {event_id}"),
        }
    }
}

fn parse_events(data: &serde_json::Value) -> Vec<MirroredEvent> {
    data["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(MirroredEvent {
                        id: item["id"].as_str()?.to_string(),
                        summary: item["summary"].as_str().unwrap_or_default().to_string(),
                        description: item["description"].as_str().unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events_skips_items_without_id() {
        let data = json!({
            "items": [
                {"id": "a1", "summary": "Ama - cornrows", "description": "Phone: 860"},
                {"summary": "no id"},
                {"id": "b2"}
            ]
        });
        let events = parse_events(&data);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].summary, "Ama - cornrows");
        assert_eq!(events[1].description, "");
        assert!(parse_events(&json!({})).is_empty());
    }

    #[test]
    fn test_calendar_id_is_escaped() {
        let calendar = GoogleCalendar::new("team#cal@group.calendar.google.com".into(), "t".into());
        let url = calendar.events_url(Some("evt1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team%23cal@group.calendar.google.com/events/evt1"
        );
    }
}
