//! Event writes and the attendee array.
//!
//! Attendance is stored as an array embedded in the event document. Join and
//! leave read the array, compute the new one and write it back whole; two
//! concurrent edits can lose one of them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use stridopt_shared::color::profile_color;
use stridopt_shared::constants::{EVENTS, MAX_EVENT_TITLE_LENGTH};
use stridopt_shared::error::Field;
use stridopt_shared::{
    parse_event_date, Attendee, AttendeeStatus, DocId, Event, EventVisibility, Identity, ThemeMode, UserId,
    ValidationError,
};
use stridopt_store::{fields, to_fields};

use super::{now_value, require_doc};
use crate::error::{ClientError, Result};
use crate::state::Backend;

/// Attendee name when the profile has no full name.
const ANONYMOUS: &str = "Anonymous";

/// User-editable part of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub visibility: EventVisibility,
}

impl EventDraft {
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let title = self.title.trim();
        if title.is_empty() {
            errors.push(ValidationError::new(Field::Title, "Title is required"));
        } else if title.chars().count() > MAX_EVENT_TITLE_LENGTH {
            errors.push(ValidationError::new(
                Field::Title,
                format!("Title must be at most {MAX_EVENT_TITLE_LENGTH} characters"),
            ));
        }
        if parse_event_date(&self.date).is_none() {
            errors.push(ValidationError::new(Field::Date, "Please pick a valid date"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn trimmed(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            location: self
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            ..self.clone()
        }
    }
}

/// The attendee entry written for `me` when joining.
pub fn attendee_for(me: &Identity, theme: ThemeMode) -> Attendee {
    let name = me.full_name.trim();
    Attendee {
        user_id: me.id.clone(),
        name: if name.is_empty() { ANONYMOUS.to_string() } else { name.to_string() },
        profile_image: me.profile_image.clone(),
        profile_color: Some(profile_color(me, theme)),
        status: Some(AttendeeStatus::Going),
    }
}

/// `attendees` with `attendee` appended, unless that user is already present.
pub fn with_attendee(attendees: &[Attendee], attendee: Attendee) -> Vec<Attendee> {
    let mut out = attendees.to_vec();
    if !out.iter().any(|a| a.user_id == attendee.user_id) {
        out.push(attendee);
    }
    out
}

/// `attendees` without any entry for `user`.
pub fn without_attendee(attendees: &[Attendee], user: &UserId) -> Vec<Attendee> {
    attendees.iter().filter(|a| &a.user_id != user).cloned().collect()
}

async fn load_event(backend: &Backend, id: &DocId) -> Result<Event> {
    let doc = backend.docs.get(EVENTS, id.as_str()).await?;
    require_doc(doc, "event", id.as_str())
}

async fn owned_event(backend: &Backend, me: &Identity, id: &DocId) -> Result<Event> {
    let event = load_event(backend, id).await?;
    if !event.is_owned_by(&me.id) {
        return Err(ClientError::Forbidden("only the owner can change this event"));
    }
    Ok(event)
}

pub async fn create_event(backend: &Backend, me: &Identity, draft: &EventDraft) -> Result<DocId> {
    let draft = draft.trimmed();
    draft.validate()?;

    let now = Utc::now();
    let event = Event {
        title: draft.title,
        description: draft.description,
        date: draft.date,
        start_time: draft.start_time,
        end_time: draft.end_time,
        location: draft.location,
        visibility: draft.visibility,
        user_id: me.id.clone(),
        creator_id: me.id.clone(),
        created_at: Some(now),
        updated_at: Some(now),
        ..Default::default()
    };
    let id = backend.docs.create(EVENTS, to_fields(&event)?).await?;
    info!(event = %id, visibility = event.visibility.as_str(), "event created");
    Ok(DocId::new(id))
}

/// Merge the draft into the stored event. Attendees are left untouched.
pub async fn update_event(backend: &Backend, me: &Identity, id: &DocId, draft: &EventDraft) -> Result<()> {
    let draft = draft.trimmed();
    draft.validate()?;
    owned_event(backend, me, id).await?;

    let mut patch = to_fields(&draft)?;
    patch.insert("updatedAt".to_string(), now_value());
    if draft.location.is_none() {
        patch.insert("location".to_string(), Value::Null);
    }
    backend.docs.update(EVENTS, id.as_str(), patch).await?;
    debug!(event = %id, "event updated");
    Ok(())
}

pub async fn delete_event(backend: &Backend, me: &Identity, id: &DocId) -> Result<()> {
    owned_event(backend, me, id).await?;
    backend.docs.delete(EVENTS, id.as_str()).await?;
    info!(event = %id, "event deleted");
    Ok(())
}

/// Add `me` to the attendee array. Returns `false` if already attending.
pub async fn join_event(backend: &Backend, me: &Identity, id: &DocId, theme: ThemeMode) -> Result<bool> {
    let event = load_event(backend, id).await?;
    if event.is_attended_by(&me.id) {
        return Ok(false);
    }
    let attendees = with_attendee(&event.attendees, attendee_for(me, theme));
    write_attendees(backend, id, &attendees).await?;
    debug!(event = %id, count = attendees.len(), "joined event");
    Ok(true)
}

/// Remove `me` from the attendee array. Returns `false` if not attending.
pub async fn leave_event(backend: &Backend, me: &Identity, id: &DocId) -> Result<bool> {
    let event = load_event(backend, id).await?;
    if !event.is_attended_by(&me.id) {
        return Ok(false);
    }
    let attendees = without_attendee(&event.attendees, &me.id);
    write_attendees(backend, id, &attendees).await?;
    debug!(event = %id, count = attendees.len(), "left event");
    Ok(true)
}

async fn write_attendees(backend: &Backend, id: &DocId, attendees: &[Attendee]) -> Result<()> {
    let attendees = serde_json::to_value(attendees).map_err(stridopt_shared::SharedError::from)?;
    backend
        .docs
        .update(
            EVENTS,
            id.as_str(),
            fields(json!({ "attendees": attendees, "updatedAt": now_value() })),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stridopt_store::MemoryBackend;

    fn identity(uid: &str, name: &str) -> Identity {
        Identity {
            id: UserId::new(uid),
            email: format!("{uid}@example.com"),
            full_name: name.to_string(),
            ..Default::default()
        }
    }

    fn draft(title: &str) -> EventDraft {
        EventDraft {
            title: title.to_string(),
            date: "2024-05-01".to_string(),
            start_time: "09:00".to_string(),
            end_time: "10:00".to_string(),
            visibility: EventVisibility::Friends,
            ..Default::default()
        }
    }

    #[test]
    fn draft_validation() {
        assert!(draft("Run club").validate().is_ok());

        let errors = draft("   ").validate().unwrap_err();
        assert_eq!(errors[0].field, Field::Title);

        let long = "x".repeat(MAX_EVENT_TITLE_LENGTH + 1);
        assert_eq!(draft(&long).validate().unwrap_err().len(), 1);

        let mut bad_date = draft("Run club");
        bad_date.date = "soon".into();
        assert!(bad_date.validate().is_err());
    }

    #[test]
    fn attendee_array_edits() {
        let ana = identity("a", "Ana");
        let nameless = identity("b", "  ");

        let list = with_attendee(&[], attendee_for(&ana, ThemeMode::Light));
        let list = with_attendee(&list, attendee_for(&nameless, ThemeMode::Dark));
        let list = with_attendee(&list, attendee_for(&ana, ThemeMode::Light));
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name, ANONYMOUS);
        assert!(list[0].profile_color.as_deref().unwrap().starts_with("hsl("));

        let list = without_attendee(&list, &ana.id);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].user_id, nameless.id);
    }

    #[test]
    fn stored_color_wins() {
        let mut ana = identity("a", "Ana");
        ana.profile_color = Some("#ff8800".into());
        assert_eq!(attendee_for(&ana, ThemeMode::Dark).profile_color.as_deref(), Some("#ff8800"));
    }

    #[tokio::test]
    async fn join_leave_round_trip() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let owner = identity("owner", "Olu");
        let guest = identity("guest", "Gus");

        let id = create_event(&backend, &owner, &draft(" Run club ")).await.unwrap();
        let stored: Event = memory.documents(EVENTS)[0].decode().unwrap();
        assert_eq!(stored.title, "Run club");
        assert_eq!(stored.user_id, owner.id);

        assert!(join_event(&backend, &guest, &id, ThemeMode::Light).await.unwrap());
        assert!(!join_event(&backend, &guest, &id, ThemeMode::Light).await.unwrap());
        let stored: Event = memory.documents(EVENTS)[0].decode().unwrap();
        assert!(stored.is_attended_by(&guest.id));
        assert_eq!(stored.attendees.len(), 1);

        assert!(leave_event(&backend, &guest, &id).await.unwrap());
        assert!(!leave_event(&backend, &guest, &id).await.unwrap());
        let stored: Event = memory.documents(EVENTS)[0].decode().unwrap();
        assert!(stored.attendees.is_empty());
    }

    #[tokio::test]
    async fn only_owner_edits() {
        let memory = MemoryBackend::new();
        let backend = Backend::in_memory(&memory);
        let owner = identity("owner", "Olu");
        let guest = identity("guest", "Gus");
        let id = create_event(&backend, &owner, &draft("Run club")).await.unwrap();

        assert!(matches!(
            update_event(&backend, &guest, &id, &draft("Mine now")).await,
            Err(ClientError::Forbidden(_))
        ));
        assert!(matches!(
            delete_event(&backend, &guest, &id).await,
            Err(ClientError::Forbidden(_))
        ));

        join_event(&backend, &guest, &id, ThemeMode::Light).await.unwrap();
        update_event(&backend, &owner, &id, &draft("Trail run")).await.unwrap();
        let stored: Event = memory.documents(EVENTS)[0].decode().unwrap();
        assert_eq!(stored.title, "Trail run");
        assert_eq!(stored.attendees.len(), 1);

        delete_event(&backend, &owner, &id).await.unwrap();
        assert!(matches!(
            join_event(&backend, &guest, &id, ThemeMode::Light).await,
            Err(ClientError::NotFound { .. })
        ));
    }
}
