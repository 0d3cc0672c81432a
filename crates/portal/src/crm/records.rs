//! Clinical records: prescriptions, documents, medical profile, consultations.

use std::num::NonZeroU32;

use patient_portal_core::{CrmUserId, PrescriptionId, UserId};
use reqwest::Method;
use reqwest::multipart::Form;
use serde_json::Value;

use super::{CrmBody, CrmClient};
use crate::upstream::ProxyError;

impl CrmClient {
    /// List prescriptions for a CRM user.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn prescriptions(
        &self,
        token: &str,
        crm_user_id: CrmUserId,
        per_page: NonZeroU32,
    ) -> Result<Value, ProxyError> {
        let path = format!("/api/prescriptions/list?crm_user_id={crm_user_id}&per_page={per_page}");
        Ok(self.call(Method::GET, &path, token, CrmBody::Empty).await?.data)
    }

    /// Fetch one prescription.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn prescription(&self, token: &str, id: PrescriptionId) -> Result<Value, ProxyError> {
        let path = format!("/api/prescriptions/{id}");
        Ok(self.call(Method::GET, &path, token, CrmBody::Empty).await?.data)
    }

    /// List documents uploaded for a user.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn documents(&self, token: &str, user_id: UserId) -> Result<Value, ProxyError> {
        let path = format!("/api/users/{user_id}/documents");
        Ok(self.call(Method::GET, &path, token, CrmBody::Empty).await?.data)
    }

    /// Upload a document for a user.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn upload_document(
        &self,
        token: &str,
        user_id: UserId,
        form: Form,
    ) -> Result<Value, ProxyError> {
        let path = format!("/api/users/{user_id}/documents");
        Ok(self
            .call(Method::POST, &path, token, CrmBody::Multipart(form))
            .await?
            .data)
    }

    /// Fetch the medical profile questionnaire answers.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn medical_profile(&self, token: &str) -> Result<Value, ProxyError> {
        Ok(self
            .call(Method::GET, "/api/user/medical-profile", token, CrmBody::Empty)
            .await?
            .data)
    }

    /// Save medical profile answers.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn update_medical_profile(
        &self,
        token: &str,
        answers: Value,
    ) -> Result<Value, ProxyError> {
        Ok(self
            .call(
                Method::POST,
                "/api/user/medical-profile",
                token,
                CrmBody::Json(answers),
            )
            .await?
            .data)
    }

    /// List past and upcoming consultations.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn consultations(&self, token: &str) -> Result<Value, ProxyError> {
        Ok(self
            .call(Method::GET, "/api/consultations/list", token, CrmBody::Empty)
            .await?
            .data)
    }
}
