use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::repository::{
    DepartmentRepository, SemesterRepository, SubjectRepository, YearRepository,
};
use crate::domain::types::{Department, Semester, Subject, Year};
use crate::error::StudyMateError;

const DEPARTMENT_NAME: &str = "BSc Computer Science";
const DEPARTMENT_CODE: &str = "BSC-CS";

struct SeedSemester {
    year: i32,
    number: i32,
    subjects: &'static [&'static str],
}

const CURRICULUM: [SeedSemester; 6] = [
    SeedSemester {
        year: 1,
        number: 1,
        subjects: &[
            "Language – Tamil / Hindi",
            "English – I",
            "Mathematical Foundations",
            "Digital Computer Fundamentals",
            "Programming in C",
            "Environmental Studies",
        ],
    },
    SeedSemester {
        year: 1,
        number: 2,
        subjects: &[
            "English – II",
            "Statistics for Computer Science",
            "Data Structures",
            "Object Oriented Programming",
            "Python Programming",
            "Value Education",
        ],
    },
    SeedSemester {
        year: 2,
        number: 3,
        subjects: &[
            "Discrete Mathematics",
            "Database Management Systems",
            "Computer Networks",
            "Operating Systems",
            "Java Programming",
            "Soft Skills",
        ],
    },
    SeedSemester {
        year: 2,
        number: 4,
        subjects: &[
            "Linear Algebra",
            "Software Engineering",
            "Web Technology",
            "Microprocessor and Assembly Language",
            "Design and Analysis of Algorithms",
            "Gender Studies",
        ],
    },
    SeedSemester {
        year: 3,
        number: 5,
        subjects: &[
            "Theory of Computation",
            "Computer Graphics",
            "Mobile Application Development",
            "Cloud Computing",
            "Elective – I",
            "Extension Activities",
        ],
    },
    SeedSemester {
        year: 3,
        number: 6,
        subjects: &[
            "Artificial Intelligence",
            "Data Science",
            "Cyber Security",
            "Project Work",
            "Elective – II",
        ],
    },
];

/// Records created by one seed run. All zero on a re-run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub departments: u32,
    pub years: u32,
    pub semesters: u32,
    pub subjects: u32,
}

// ── SeedAcademicStructure ────────────────────────────────────────────────────

pub struct SeedAcademicStructureUseCase<D, Y, S, J>
where
    D: DepartmentRepository,
    Y: YearRepository,
    S: SemesterRepository,
    J: SubjectRepository,
{
    pub departments: D,
    pub years: Y,
    pub semesters: S,
    pub subjects: J,
}

impl<D, Y, S, J> SeedAcademicStructureUseCase<D, Y, S, J>
where
    D: DepartmentRepository,
    Y: YearRepository,
    S: SemesterRepository,
    J: SubjectRepository,
{
    /// Get-or-create every level of the curriculum.
    pub async fn execute(&self) -> Result<SeedReport, StudyMateError> {
        let mut report = SeedReport::default();

        let department = match self.departments.find_by_name(DEPARTMENT_NAME).await? {
            Some(department) => department,
            None => {
                let department = Department {
                    id: Uuid::now_v7(),
                    name: DEPARTMENT_NAME.to_owned(),
                    code: DEPARTMENT_CODE.to_owned(),
                    created_at: Utc::now(),
                };
                self.departments.create(&department).await?;
                report.departments += 1;
                department
            }
        };

        for entry in &CURRICULUM {
            let year = self.year(entry.year, &mut report).await?;
            let semester = self
                .semester(department.id, year.id, entry.number, &mut report)
                .await?;
            for name in entry.subjects {
                if self.subjects.find_by_name(semester.id, name).await?.is_none() {
                    let subject = Subject {
                        id: Uuid::now_v7(),
                        semester_id: semester.id,
                        name: (*name).to_owned(),
                        code: None,
                        created_at: Utc::now(),
                    };
                    self.subjects.create(&subject).await?;
                    report.subjects += 1;
                }
            }
        }

        info!(?report, "academic structure seeded");
        Ok(report)
    }

    async fn year(&self, number: i32, report: &mut SeedReport) -> Result<Year, StudyMateError> {
        let name = format!("Year {number}");
        if let Some(year) = self.years.find_by_name(&name).await? {
            return Ok(year);
        }
        let year = Year {
            id: Uuid::now_v7(),
            name,
            number,
            created_at: Utc::now(),
        };
        self.years.create(&year).await?;
        report.years += 1;
        Ok(year)
    }

    async fn semester(
        &self,
        department_id: Uuid,
        year_id: Uuid,
        number: i32,
        report: &mut SeedReport,
    ) -> Result<Semester, StudyMateError> {
        if let Some(semester) = self
            .semesters
            .find_by_key(Some(department_id), year_id, number)
            .await?
        {
            return Ok(semester);
        }
        let semester = Semester {
            id: Uuid::now_v7(),
            department_id: Some(department_id),
            year_id,
            name: format!("Semester {number}"),
            number,
            created_at: Utc::now(),
        };
        self.semesters.create(&semester).await?;
        report.semesters += 1;
        Ok(semester)
    }
}
