use super::payment::{CourseId, Payment, PaymentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course in a user's entitlement set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub course: CourseId,
    pub payment: PaymentId,
    pub enrolled_at: DateTime<Utc>,
    /// Percentage of the course completed, starts at 0.
    pub progress: u8,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
}

/// Everything a user has been granted access to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserEntitlements {
    pub user: Option<UserId>,
    pub enrollments: Vec<Enrollment>,
    /// Payments that granted access, in grant order.
    pub payment_history: Vec<PaymentId>,
}

impl UserEntitlements {
    pub fn new(user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn is_enrolled(&self, course: &CourseId) -> bool {
        self.enrollments.iter().any(|e| &e.course == course)
    }

    /// Appends the grant. The enrollment is only added once per course.
    pub fn apply(&mut self, grant: &EnrollmentGrant) {
        if !self.is_enrolled(&grant.course) {
            self.enrollments.push(Enrollment {
                course: grant.course.clone(),
                payment: grant.payment,
                enrolled_at: grant.enrolled_at,
                progress: 0,
                completed_lessons: Vec::new(),
            });
        }
        if !self.payment_history.contains(&grant.payment) {
            self.payment_history.push(grant.payment);
        }
    }
}

/// Aggregate counters for a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CourseStats {
    pub enrollment_count: u64,
}

/// The unit of work handed to the entitlement store. Keyed by `payment`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentGrant {
    pub payment: PaymentId,
    pub user: UserId,
    pub course: CourseId,
    pub enrolled_at: DateTime<Utc>,
}

impl EnrollmentGrant {
    pub fn for_payment(payment: &Payment) -> Self {
        Self {
            payment: payment.id,
            user: payment.user.clone(),
            course: payment.course.clone(),
            enrolled_at: payment.completed_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The payment granted access just now; the course counter moved by one.
    Granted,
    /// The payment had already granted access; nothing changed.
    AlreadyGranted,
}
