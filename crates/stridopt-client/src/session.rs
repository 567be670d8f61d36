//! Session store.
//!
//! Publishes the signed-in [`Identity`] (the profile document, not the raw
//! credential) through a watch channel. At boot the last known identity is
//! read from the local cache so it is available before the provider
//! confirms; afterwards a background task follows the provider's
//! identity-changed stream, creating the profile document on first sight.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use stridopt_shared::color::{derived_profile_color, profile_color, Hsl};
use stridopt_shared::constants::{PROFILE_IMAGES_PREFIX, SESSION_KEY, USERS};
use stridopt_shared::validation::{
    sanitize_email, sanitize_password, validate_confirmation, validate_email, validate_full_name,
    validate_password, RegistrationForm, SignInForm,
};
use stridopt_shared::{Identity, ThemeMode, ValidationError};
use stridopt_store::{fields, to_fields, AuthUser, StoreError};

use crate::error::{ClientError, Result};
use crate::state::Backend;

struct Inner {
    backend: Backend,
    theme: ThemeMode,
    identity: watch::Sender<Option<Identity>>,
    /// Serialises profile creation between explicit sign-up and the
    /// identity-change follower.
    profile_gate: Mutex<()>,
}

pub struct Session {
    inner: Arc<Inner>,
    follower: JoinHandle<()>,
}

impl Session {
    /// Publish the cached identity, then start following the provider.
    pub async fn start(backend: Backend, theme: ThemeMode) -> Result<Self> {
        let cached = load_cached(&backend).await;
        if let Some(identity) = &cached {
            debug!(uid = %identity.id, "restored cached session");
        }

        let (identity, _) = watch::channel(cached);
        let inner = Arc::new(Inner {
            backend,
            theme,
            identity,
            profile_gate: Mutex::new(()),
        });

        let follower = tokio::spawn(follow_auth(inner.clone()));
        Ok(Self { inner, follower })
    }

    pub fn current(&self) -> Option<Identity> {
        self.inner.identity.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.identity.subscribe()
    }

    pub fn require(&self) -> Result<Identity> {
        self.current().ok_or(ClientError::NotSignedIn)
    }

    pub fn theme(&self) -> ThemeMode {
        self.inner.theme
    }

    /// Validate locally, register, then write the profile document with a
    /// derived color.
    pub async fn sign_up(&self, form: &RegistrationForm, today: NaiveDate) -> Result<Identity> {
        let form = form.sanitized();
        form.validate(today)?;

        let _gate = self.inner.profile_gate.lock().await;
        let auth = &self.inner.backend.auth;
        let user = auth.register(&form.email, &form.password).await?;
        auth.update_display_name(&form.full_name).await?;

        let now = Utc::now();
        let mut identity = Identity {
            id: user.uid.clone(),
            email: form.email.clone(),
            full_name: form.full_name.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        identity.profile_color = Some(derived_profile_color(&identity, ThemeMode::Light));

        self.inner
            .backend
            .docs
            .set(USERS, user.uid.as_str(), to_fields(&identity)?)
            .await?;
        info!(uid = %identity.id, "account registered");

        self.inner.publish(Some(identity.clone())).await;
        Ok(identity)
    }

    pub async fn sign_in(&self, form: &SignInForm) -> Result<Identity> {
        let form = form.sanitized();
        form.validate()?;

        let user = self
            .inner
            .backend
            .auth
            .sign_in(&form.email, &form.password)
            .await?;
        let identity = self.inner.resolve_profile(&user).await?;
        self.inner.publish(Some(identity.clone())).await;
        info!(uid = %identity.id, "signed in");
        Ok(identity)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.inner.backend.auth.sign_out().await?;
        self.inner.publish(None).await;
        info!("signed out");
        Ok(())
    }

    pub async fn update_email(&self, email: &str) -> Result<Identity> {
        let me = self.require()?;
        let email = sanitize_email(email);
        validate_email(&email)?;

        let result = self.inner.backend.auth.update_email(&email).await;
        self.check_reauth(result).await?;

        self.update_profile(&me, json!({ "email": email }), |identity| {
            identity.email = email.clone();
        })
        .await
    }

    pub async fn update_password(&self, password: &str, confirmation: &str) -> Result<()> {
        self.require()?;
        let password = sanitize_password(password);
        let confirmation = sanitize_password(confirmation);
        let errors: Vec<ValidationError> = [
            validate_password(&password),
            validate_confirmation(&password, &confirmation),
        ]
        .into_iter()
        .filter_map(std::result::Result::err)
        .collect();
        if !errors.is_empty() {
            return Err(ClientError::Validation(errors));
        }

        let result = self.inner.backend.auth.update_password(&password).await;
        self.check_reauth(result).await
    }

    pub async fn update_display_name(&self, name: &str) -> Result<Identity> {
        let me = self.require()?;
        let name = name.trim().to_string();
        validate_full_name(&name)?;

        let result = self.inner.backend.auth.update_display_name(&name).await;
        self.check_reauth(result).await?;

        self.update_profile(&me, json!({ "fullName": name }), |identity| {
            identity.full_name = name.clone();
        })
        .await
    }

    /// Store an explicit color token (`hsl(H, S%, L%)` or `#rrggbb`).
    pub async fn set_profile_color(&self, color: &str) -> Result<Identity> {
        let me = self.require()?;
        let color = color.trim().to_string();
        if Hsl::parse(&color).is_err() && !is_hex_color(&color) {
            return Err(ClientError::Shared(stridopt_shared::SharedError::InvalidColor(color)));
        }
        self.update_profile(&me, json!({ "profileColor": color }), |identity| {
            identity.profile_color = Some(color.clone());
        })
        .await
    }

    /// Replace the stored color with the derived one for the current theme.
    pub async fn reset_profile_color(&self) -> Result<Identity> {
        let me = self.require()?;
        let color = derived_profile_color(&me, self.inner.theme);
        self.update_profile(&me, json!({ "profileColor": color }), |identity| {
            identity.profile_color = Some(color.clone());
        })
        .await
    }

    /// The color to render for the current user, persisting a derived one if
    /// none is stored yet.
    pub async fn ensure_profile_color(&self) -> Result<String> {
        let me = self.require()?;
        if let Some(color) = me.profile_color.as_deref().filter(|c| !c.is_empty()) {
            return Ok(color.to_string());
        }
        let updated = self.reset_profile_color().await?;
        Ok(profile_color(&updated, self.inner.theme))
    }

    pub async fn upload_avatar(&self, image: Bytes) -> Result<Identity> {
        let me = self.require()?;
        if image.is_empty() {
            return Err(ClientError::Invalid("empty image"));
        }
        let path = format!("{PROFILE_IMAGES_PREFIX}/{}", me.id);
        let url = self.inner.backend.blobs.put(&path, image).await?;
        self.update_profile(&me, json!({ "profileImage": url }), |identity| {
            identity.profile_image = Some(url.clone());
        })
        .await
    }

    /// A recent-login rejection also ends the session.
    async fn check_reauth(&self, result: stridopt_store::Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = ClientError::from(e);
                if err.requires_reauth() {
                    warn!("sensitive change requires a recent login, signing out");
                    if let Err(e) = self.sign_out().await {
                        error!(error = %e, "sign-out after reauth failure failed");
                    }
                }
                Err(err)
            }
        }
    }

    async fn update_profile(
        &self,
        me: &Identity,
        patch: Value,
        apply: impl FnOnce(&mut Identity),
    ) -> Result<Identity> {
        let now = Utc::now();
        let mut patch = fields(patch);
        patch.insert("updatedAt".into(), json!(now));
        self.inner
            .backend
            .docs
            .update(USERS, me.id.as_str(), patch)
            .await?;

        let mut updated = me.clone();
        apply(&mut updated);
        updated.updated_at = Some(now);
        self.inner.publish(Some(updated.clone())).await;
        Ok(updated)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.follower.abort();
    }
}

impl Inner {
    /// Load the profile document for `user`, creating it when absent.
    async fn resolve_profile(&self, user: &AuthUser) -> Result<Identity> {
        let _gate = self.profile_gate.lock().await;
        let docs = &self.backend.docs;

        if let Some(doc) = docs.get(USERS, user.uid.as_str()).await? {
            let mut identity = crate::commands::decode_identity(&doc)?;
            identity.id = user.uid.clone();
            if identity.email.is_empty() {
                identity.email = user.email.clone();
            }
            if identity.full_name.is_empty() {
                identity.full_name = user.display_name.clone().unwrap_or_default();
            }
            return Ok(identity);
        }

        let now = Utc::now();
        let mut identity = Identity {
            id: user.uid.clone(),
            email: user.email.clone(),
            full_name: user.display_name.clone().unwrap_or_default(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        identity.profile_color = Some(derived_profile_color(&identity, ThemeMode::Light));
        docs.set(USERS, user.uid.as_str(), to_fields(&identity)?)
            .await?;
        info!(uid = %identity.id, "created missing profile document");
        Ok(identity)
    }

    /// Publish and mirror into the local cache. Cache failures are logged only.
    async fn publish(&self, identity: Option<Identity>) {
        let kv = &self.backend.kv;
        let cached = match &identity {
            Some(identity) => match serde_json::to_string(identity) {
                Ok(json) => kv.set(SESSION_KEY, &json).await,
                Err(e) => Err(StoreError::from(e)),
            },
            None => kv.remove(SESSION_KEY).await,
        };
        if let Err(e) = cached {
            error!(error = %e, "failed to update session cache");
        }
        self.identity.send_replace(identity);
    }
}

async fn load_cached(backend: &Backend) -> Option<Identity> {
    match backend.kv.get(SESSION_KEY).await {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "discarding unreadable session cache");
                let _ = backend.kv.remove(SESSION_KEY).await;
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            error!(error = %e, "failed to read session cache");
            None
        }
    }
}

async fn follow_auth(inner: Arc<Inner>) {
    let mut rx = inner.backend.auth.watch();
    loop {
        let user = rx.borrow_and_update().clone();
        match user {
            Some(user) => match inner.resolve_profile(&user).await {
                Ok(identity) => {
                    // The provider may have moved on while the profile loaded.
                    let superseded = rx.borrow().as_ref().map(|u| &u.uid) != Some(&user.uid);
                    let unchanged = inner.identity.borrow().as_ref() == Some(&identity);
                    if !superseded && !unchanged {
                        inner.publish(Some(identity)).await;
                    }
                }
                Err(e) => error!(uid = %user.uid, error = %e, "failed to load profile"),
            },
            None => {
                if inner.identity.borrow().is_some() {
                    debug!("provider reports no user");
                }
                inner.publish(None).await;
            }
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn is_hex_color(s: &str) -> bool {
    s.strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
