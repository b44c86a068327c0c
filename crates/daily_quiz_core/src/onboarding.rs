//! crates/daily_quiz_core/src/onboarding.rs
//!
//! The onboarding wizard: a fixed sequence of steps with per-step validation,
//! ending in a single `POST /api/profile/onboarding`.

use serde::Serialize;
use tracing::debug;

use crate::domain::{CatalogEntry, Profile};
use crate::error::{ClientError, ClientResult};
use crate::profile::ProfileResolver;

pub const MEDICAL_YEARS: std::ops::RangeInclusive<u32> = 1..=6;

/// Goals offered on the goal step, as `(id, label)`.
pub const MAIN_GOALS: &[(&str, &str)] = &[
    ("mir", "Preparar el MIR"),
    ("university", "Aprobar la carrera"),
    ("review", "Repasar y mantenerme al día"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    MedicalYear,
    Specialty,
    Goal,
    University,
    Visibility,
    Review,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 6] = [
        OnboardingStep::MedicalYear,
        OnboardingStep::Specialty,
        OnboardingStep::Goal,
        OnboardingStep::University,
        OnboardingStep::Visibility,
        OnboardingStep::Review,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|step| *step == self).unwrap_or(0)
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

/// The body of `POST /api/profile/onboarding`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingPayload {
    pub medical_year: u32,
    pub mir_specialty: Option<String>,
    pub main_goal: String,
    pub university: String,
    pub profile_public: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnboardingDraft {
    pub medical_year: Option<u32>,
    pub mir_specialty: Option<String>,
    pub main_goal: Option<String>,
    pub university: Option<String>,
    pub profile_public: bool,
}

#[derive(Debug, Clone)]
pub struct OnboardingWizard {
    step: OnboardingStep,
    draft: OnboardingDraft,
    universities: Vec<CatalogEntry>,
    specialties: Vec<CatalogEntry>,
}

impl Default for OnboardingWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl OnboardingWizard {
    pub fn new() -> Self {
        Self {
            step: OnboardingStep::MedicalYear,
            draft: OnboardingDraft::default(),
            universities: Vec::new(),
            specialties: Vec::new(),
        }
    }

    /// Starts from whatever the profile already has.
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            draft: OnboardingDraft {
                medical_year: profile.medical_year,
                mir_specialty: profile.mir_specialty.clone(),
                main_goal: profile.main_goal.clone(),
                university: profile.university.clone(),
                profile_public: profile.profile_public,
            },
            ..Self::new()
        }
    }

    /// Loads both catalogs concurrently.
    pub async fn load_catalogs(&mut self, resolver: &ProfileResolver) -> ClientResult<()> {
        let (universities, specialties) =
            tokio::join!(resolver.universities(), resolver.mir_specialties());
        self.universities = universities?;
        self.specialties = specialties?;
        debug!(
            "Loaded {} universities and {} specialties",
            self.universities.len(),
            self.specialties.len()
        );
        Ok(())
    }

    pub fn step(&self) -> OnboardingStep {
        self.step
    }

    pub fn draft(&self) -> &OnboardingDraft {
        &self.draft
    }

    pub fn universities(&self) -> &[CatalogEntry] {
        &self.universities
    }

    pub fn specialties(&self) -> &[CatalogEntry] {
        &self.specialties
    }

    pub fn set_medical_year(&mut self, year: u32) {
        self.draft.medical_year = Some(year);
    }

    pub fn set_specialty(&mut self, specialty: Option<String>) {
        self.draft.mir_specialty = specialty.filter(|s| !s.trim().is_empty());
    }

    pub fn set_goal(&mut self, goal: &str) {
        self.draft.main_goal = Some(goal.to_string());
    }

    pub fn set_university(&mut self, university: &str) {
        self.draft.university = Some(university.to_string());
    }

    pub fn set_public(&mut self, public: bool) {
        self.draft.profile_public = public;
    }

    /// Validates the current step and advances. Stays on the review step.
    pub fn next(&mut self) -> ClientResult<OnboardingStep> {
        self.validate(self.step)?;
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(self.step)
    }

    /// Goes back one step; a no-op on the first.
    pub fn back(&mut self) -> OnboardingStep {
        if let Some(previous) = self.step.previous() {
            self.step = previous;
        }
        self.step
    }

    pub fn validate(&self, step: OnboardingStep) -> ClientResult<()> {
        let draft = &self.draft;
        match step {
            OnboardingStep::MedicalYear => match draft.medical_year {
                Some(year) if MEDICAL_YEARS.contains(&year) => Ok(()),
                _ => Err(invalid("Selecciona tu curso")),
            },
            OnboardingStep::Specialty => match &draft.mir_specialty {
                Some(specialty) if !in_catalog(&self.specialties, specialty) => {
                    Err(invalid("Especialidad no válida"))
                }
                _ => Ok(()),
            },
            OnboardingStep::Goal => match &draft.main_goal {
                Some(goal) if MAIN_GOALS.iter().any(|(id, _)| id == goal) => Ok(()),
                _ => Err(invalid("Selecciona un objetivo")),
            },
            OnboardingStep::University => match &draft.university {
                Some(university) if in_catalog(&self.universities, university) => Ok(()),
                _ => Err(invalid("Selecciona tu universidad")),
            },
            OnboardingStep::Visibility | OnboardingStep::Review => Ok(()),
        }
    }

    /// Builds the request body once every step validates.
    pub fn payload(&self) -> ClientResult<OnboardingPayload> {
        for step in OnboardingStep::ALL {
            self.validate(step)?;
        }
        let draft = &self.draft;
        match (draft.medical_year, &draft.main_goal, &draft.university) {
            (Some(medical_year), Some(main_goal), Some(university)) => Ok(OnboardingPayload {
                medical_year,
                mir_specialty: draft.mir_specialty.clone(),
                main_goal: main_goal.clone(),
                university: university.clone(),
                profile_public: draft.profile_public,
            }),
            _ => Err(invalid("Faltan datos por completar")),
        }
    }

    /// Submits from the review step.
    pub async fn submit(&self, resolver: &ProfileResolver) -> ClientResult<()> {
        if self.step != OnboardingStep::Review {
            return Err(invalid("Revisa tus datos antes de continuar"));
        }
        let payload = self.payload()?;
        resolver.submit_onboarding(&payload).await
    }
}

/// An empty catalog (not loaded or failed) accepts any non-empty value.
fn in_catalog(catalog: &[CatalogEntry], value: &str) -> bool {
    if value.trim().is_empty() {
        return false;
    }
    catalog.is_empty() || catalog.iter().any(|entry| entry.id == value || entry.name == value)
}

fn invalid(message: &str) -> ClientError {
    ClientError::Validation(message.to_string())
}
