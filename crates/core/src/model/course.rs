use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, ModuleId};
use crate::model::lesson::Lesson;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyCourseTitle,

    #[error("module title cannot be empty")]
    EmptyModuleTitle,

    #[error("lesson {lesson} belongs to module {actual}, not {expected}")]
    ForeignLesson {
        lesson: LessonId,
        expected: ModuleId,
        actual: ModuleId,
    },

    #[error("module {module} belongs to course {actual}, not {expected}")]
    ForeignModule {
        module: ModuleId,
        expected: CourseId,
        actual: CourseId,
    },
}

/// Top-level container of modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    id: CourseId,
    title: String,
    ordering: i64,
}

impl Course {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyCourseTitle` if the title is blank.
    pub fn new(id: CourseId, title: impl Into<String>, ordering: i64) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyCourseTitle);
        }
        Ok(Self {
            id,
            title,
            ordering,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn ordering(&self) -> i64 {
        self.ordering
    }
}

/// Ordered group of lessons inside a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    id: ModuleId,
    course_id: CourseId,
    title: String,
    order: i64,
}

impl CourseModule {
    /// # Errors
    ///
    /// Returns `CourseError::EmptyModuleTitle` if the title is blank.
    pub fn new(
        id: ModuleId,
        course_id: CourseId,
        title: impl Into<String>,
        order: i64,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyModuleTitle);
        }
        Ok(Self {
            id,
            course_id,
            title,
            order,
        })
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn order(&self) -> i64 {
        self.order
    }
}

/// A module together with its lessons, ordered by lesson order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTree {
    pub module: CourseModule,
    pub lessons: Vec<Lesson>,
}

/// Course → module → lesson structure as read from the catalog.
///
/// Modules are sorted by `(order, id)`, lessons likewise within each module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseTree {
    course: Course,
    modules: Vec<ModuleTree>,
}

impl CourseTree {
    /// Assembles a tree, sorting every level by its order field.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if a module or lesson is attached to the wrong parent.
    pub fn new(course: Course, modules: Vec<ModuleTree>) -> Result<Self, CourseError> {
        let mut modules = modules;
        for tree in &mut modules {
            if tree.module.course_id() != course.id() {
                return Err(CourseError::ForeignModule {
                    module: tree.module.id(),
                    expected: course.id(),
                    actual: tree.module.course_id(),
                });
            }
            if let Some(stray) = tree
                .lessons
                .iter()
                .find(|lesson| lesson.module_id() != tree.module.id())
            {
                return Err(CourseError::ForeignLesson {
                    lesson: stray.id(),
                    expected: tree.module.id(),
                    actual: stray.module_id(),
                });
            }
            tree.lessons.sort_by_key(|lesson| (lesson.order(), lesson.id()));
        }
        modules.sort_by_key(|tree| (tree.module.order(), tree.module.id()));
        Ok(Self { course, modules })
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleTree] {
        &self.modules
    }

    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.modules.iter().flat_map(|tree| tree.lessons.iter())
    }

    /// Every lesson id under this course, in display order.
    #[must_use]
    pub fn lesson_ids(&self) -> Vec<LessonId> {
        self.lessons().map(Lesson::id).collect()
    }

    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|tree| tree.lessons.len()).sum()
    }
}
