use crate::domain::course::Course;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct CourseSummary {
    course: String,
    paid: bool,
    price: Decimal,
    /// Student ids joined with `;`, in id order.
    enrolled: String,
    enrollment_count: u64,
    payments: usize,
}

/// Writes one summary row per course.
pub struct CourseWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CourseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// `courses` pairs each course with the number of payments recorded for it.
    pub fn write_courses(&mut self, courses: Vec<(Course, usize)>) -> Result<()> {
        for (course, payments) in courses {
            let enrolled = course
                .enrolled
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(";");
            self.writer.serialize(CourseSummary {
                course: course.id.to_string(),
                paid: course.is_paid,
                price: course.price.value().normalize(),
                enrolled,
                enrollment_count: course.enrollment_count,
                payments,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
