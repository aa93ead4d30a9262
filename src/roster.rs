use crate::api::{ApiError, SchoolApi};
use crate::model::{ClassSection, SelectionKey, SelectionLabels, Student, SubjectAssignment};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// The signed-in teacher. Passed in explicitly wherever it is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub teacher_email: String,
}

impl Session {
    pub fn new(teacher_email: impl Into<String>) -> Self {
        Self {
            teacher_email: teacher_email.into().trim().to_string(),
        }
    }

    pub fn is_teacher(&self, email: &str) -> bool {
        email.trim().eq_ignore_ascii_case(&self.teacher_email)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassOptions {
    pub assignments: Vec<SubjectAssignment>,
    pub classes: Vec<ClassSection>,
}

#[derive(Clone)]
pub struct RosterResolver {
    api: Arc<dyn SchoolApi>,
    session: Session,
}

impl RosterResolver {
    pub fn new(api: Arc<dyn SchoolApi>, session: Session) -> Self {
        Self { api, session }
    }

    pub fn api(&self) -> &dyn SchoolApi {
        self.api.as_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// (class, subject) pairs the teacher may mark, one entry per pair.
    pub fn resolve_classes(&self) -> Result<Vec<SubjectAssignment>, ApiError> {
        let entries = self.api.list_timetable()?;
        let mut by_pair: BTreeMap<(i64, i64), SubjectAssignment> = BTreeMap::new();
        for e in entries.into_iter().filter(|e| self.session.is_teacher(&e.teacher)) {
            by_pair
                .entry((e.class_id, e.subject))
                .or_insert_with(|| SubjectAssignment {
                    class_id: e.class_id,
                    subject_id: e.subject,
                    subject_name: e.subject_name.clone(),
                    teacher_email: self.session.teacher_email.clone(),
                });
        }
        let mut out: Vec<SubjectAssignment> = by_pair.into_values().collect();
        out.sort_by(|a, b| {
            a.class_id
                .cmp(&b.class_id)
                .then_with(|| a.subject_name.cmp(&b.subject_name))
                .then_with(|| a.subject_id.cmp(&b.subject_id))
        });
        Ok(out)
    }

    pub fn resolve_students(&self, class_id: i64) -> Result<Vec<Student>, ApiError> {
        let mut students: Vec<Student> = self
            .api
            .list_students()?
            .into_iter()
            .filter(|s| s.class_id == class_id)
            .collect();
        students.sort_by(|a, b| {
            a.fullname
                .to_lowercase()
                .cmp(&b.fullname.to_lowercase())
                .then_with(|| a.email.cmp(&b.email))
        });
        Ok(students)
    }

    pub fn class_options(&self) -> Result<ClassOptions, ApiError> {
        let assignments = self.resolve_classes()?;
        let wanted: HashSet<i64> = assignments.iter().map(|a| a.class_id).collect();
        let mut classes: Vec<ClassSection> = self
            .api
            .list_classes()?
            .into_iter()
            .filter(|c| wanted.contains(&c.id))
            .collect();
        classes.sort_by(|a, b| {
            a.class_name
                .cmp(&b.class_name)
                .then_with(|| a.section.cmp(&b.section))
        });
        Ok(ClassOptions {
            assignments,
            classes,
        })
    }

    /// Names copied into write items. Unknown ids resolve to empty labels.
    pub fn resolve_labels(&self, key: &SelectionKey) -> Result<SelectionLabels, ApiError> {
        let mut labels = SelectionLabels::default();
        let Some(class_id) = key.class_id else {
            return Ok(labels);
        };
        if let Some(c) = self.api.list_classes()?.into_iter().find(|c| c.id == class_id) {
            labels.class_name = c.class_name;
            labels.section = c.section;
        }
        if let Some(subject_id) = key.subject_id {
            if let Some(e) = self
                .api
                .list_timetable()?
                .into_iter()
                .find(|e| e.class_id == class_id && e.subject == subject_id)
            {
                labels.subject_name = e.subject_name;
            }
        }
        Ok(labels)
    }
}
