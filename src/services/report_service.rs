// src/services/report_service.rs
use crate::{
    config::MailConfig,
    error::{AppError, AppResult},
    models::{
        account::{Account, AccountStatus, Role},
        merit::{MeritKind, RecordWithStudent},
    },
    services::{
        account_service, class_service,
        mail_service::{self, XlsxMail},
        merit_service,
        spreadsheet_service::{write_header, write_record_rows, RECORD_HEADERS},
    },
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;
use sqlx::SqlitePool;

const SUMMARY_HEADERS: [&str; 6] = ["번호", "학번", "이름", "오늘 상점", "오늘 벌점", "누적점수"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StudentDaySummary {
    pub student_number: i64,
    pub student_code: String,
    pub name: String,
    pub merit_today: i64,
    pub demerit_today: i64,
    pub cumulative_score: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub class_label: String,
    pub teacher_name: String,
    pub date: NaiveDate,
    pub students: Vec<StudentDaySummary>,
    pub records: Vec<RecordWithStudent>,
}

/// UTC range `[start, end)` covering one local calendar day.
pub fn local_day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_default();
    (start, start + Duration::days(1))
}

/// Per-student totals for the day. `records` may contain other days; they are ignored.
pub fn summarize_day(
    students: &[Account],
    records: &[RecordWithStudent],
    date: NaiveDate,
    offset: FixedOffset,
) -> (Vec<StudentDaySummary>, Vec<RecordWithStudent>) {
    let (start, end) = local_day_bounds(date, offset);
    let todays: Vec<RecordWithStudent> = records
        .iter()
        .filter(|r| r.created_at >= start && r.created_at < end)
        .cloned()
        .collect();

    let summaries = students
        .iter()
        .map(|student| {
            let (merit_today, demerit_today) = todays
                .iter()
                .filter(|r| r.student_id == student.id)
                .fold((0, 0), |(m, d), r| match r.kind {
                    MeritKind::Merit => (m + r.points, d),
                    MeritKind::Demerit => (m, d - r.points),
                });
            StudentDaySummary {
                student_number: student.student_number.unwrap_or_default(),
                student_code: student.student_code.clone().unwrap_or_default(),
                name: student.name.clone(),
                merit_today,
                demerit_today,
                cumulative_score: student.cumulative_score,
            }
        })
        .collect();

    (summaries, todays)
}

/// Report for a homeroom teacher's class; `None` when they have no class.
pub async fn build_class_report(
    db_pool: &SqlitePool,
    teacher: &Account,
    date: NaiveDate,
    offset: FixedOffset,
) -> AppResult<Option<ClassReport>> {
    let Some(class) = class_service::class_of_homeroom(db_pool, &teacher.id).await? else {
        return Ok(None);
    };
    let students = class_service::students_of_class(db_pool, &class).await?;
    let records =
        merit_service::records_with_students(db_pool, Some(class.grade), Some(class.class_number)).await?;
    let (students, records) = summarize_day(&students, &records, date, offset);

    Ok(Some(ClassReport {
        class_label: class.label(),
        teacher_name: teacher.name.clone(),
        date,
        students,
        records,
    }))
}

pub fn render_report_xlsx(report: &ClassReport, offset: FixedOffset) -> AppResult<Vec<u8>> {
    let mut summary = Worksheet::new();
    summary.set_name("요약")?;
    write_header(&mut summary, &SUMMARY_HEADERS)?;
    for (i, s) in report.students.iter().enumerate() {
        let row = (i + 1) as u32;
        summary.write_number(row, 0, s.student_number as f64)?;
        summary.write_string(row, 1, &s.student_code)?;
        summary.write_string(row, 2, &s.name)?;
        summary.write_number(row, 3, s.merit_today as f64)?;
        summary.write_number(row, 4, s.demerit_today as f64)?;
        summary.write_number(row, 5, s.cumulative_score as f64)?;
    }

    let mut detail = Worksheet::new();
    detail.set_name("상세")?;
    write_header(&mut detail, &RECORD_HEADERS)?;
    write_record_rows(&mut detail, &report.records, offset)?;

    let mut workbook = Workbook::new();
    workbook.push_worksheet(summary);
    workbook.push_worksheet(detail);
    Ok(workbook.save_to_buffer()?)
}

fn report_mail(to: &str, report: &ClassReport, offset: FixedOffset) -> AppResult<XlsxMail> {
    Ok(XlsxMail {
        to: to.to_string(),
        subject: format!("[상벌점] {} {} 일일 보고", report.date.format("%Y-%m-%d"), report.class_label),
        body: format!(
            "{} 선생님, {} {} 상벌점 현황을 첨부합니다. (오늘 기록 {}건)",
            report.teacher_name,
            report.date.format("%Y-%m-%d"),
            report.class_label,
            report.records.len()
        ),
        filename: format!("상벌점_{}_{}.xlsx", report.class_label.replace(' ', ""), report.date.format("%Y%m%d")),
        attachment: render_report_xlsx(report, offset)?,
    })
}

/// Mails every active homeroom teacher their class report. Returns how many were sent.
pub async fn send_daily_reports(
    db_pool: &SqlitePool,
    mail: &MailConfig,
    date: NaiveDate,
    offset: FixedOffset,
) -> AppResult<usize> {
    let teachers: Vec<Account> = account_service::list_teachers(db_pool)
        .await?
        .into_iter()
        .filter(|t| t.role == Role::HomeroomTeacher && t.status == AccountStatus::Active)
        .collect();

    let mut sent = 0;
    for teacher in &teachers {
        let Some(to) = teacher.email.as_deref() else {
            continue;
        };
        let result = match build_class_report(db_pool, teacher, date, offset).await {
            Ok(Some(report)) => match report_mail(to, &report, offset) {
                Ok(message) => mail_service::send(mail, message).await,
                Err(e) => Err(e),
            },
            Ok(None) => {
                tracing::debug!("{} has no class, skipping report.", teacher.name);
                continue;
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => sent += 1,
            Err(e) => tracing::error!("Daily report for {} failed: {:?}", teacher.name, e),
        }
    }

    tracing::info!("📊 Daily reports for {}: {}/{} sent.", date, sent, teachers.len());
    Ok(sent)
}

/// Static data for the manual test endpoint.
pub fn sample_report(date: NaiveDate) -> ClassReport {
    let student = |n: i64, name: &str, merit: i64, demerit: i64, total: i64| StudentDaySummary {
        student_number: n,
        student_code: format!("101{:02}", n),
        name: name.to_string(),
        merit_today: merit,
        demerit_today: demerit,
        cumulative_score: total,
    };
    ClassReport {
        class_label: "1학년 1반".to_string(),
        teacher_name: "테스트".to_string(),
        date,
        students: vec![
            student(1, "김테스트", 2, 0, 5),
            student(2, "이테스트", 0, 1, -1),
            student(3, "박테스트", 0, 0, 0),
        ],
        records: Vec::new(),
    }
}

pub async fn send_test_report(mail: &MailConfig, to: &str, date: NaiveDate, offset: FixedOffset) -> AppResult<()> {
    if to.trim().is_empty() {
        return Err(AppError::Validation("받는 사람 이메일을 입력해 주세요.".to_string()));
    }
    let message = report_mail(to.trim(), &sample_report(date), offset)?;
    mail_service::send(mail, message).await
}

/// Next `hour:minute` local time strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32, minute: u32, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset);
    let today = local_now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .and_then(|naive| naive.and_local_timezone(offset).single());

    match today {
        Some(candidate) if candidate > local_now => candidate.with_timezone(&Utc),
        Some(candidate) => (candidate + Duration::days(1)).with_timezone(&Utc),
        None => now + Duration::days(1),
    }
}
