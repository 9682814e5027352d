// src/services/spreadsheet_service.rs
//! XLSX import/export with Korean column labels.
use crate::{
    error::{AppError, AppResult},
    models::{account::{Account, StudentRow}, merit::RecordWithStudent},
};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{Datelike, Duration, FixedOffset, NaiveDate};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::{collections::HashMap, io::Cursor};

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const COL_CODE: &str = "학번";
pub const COL_NAME: &str = "이름";
pub const COL_GRADE: &str = "학년";
pub const COL_CLASS: &str = "반";
pub const COL_NUMBER: &str = "번호";
pub const COL_BIRTH: &str = "생년월일";
pub const COL_SCORE: &str = "누적점수";

pub const STUDENT_HEADERS: [&str; 7] = [COL_CODE, COL_NAME, COL_GRADE, COL_CLASS, COL_NUMBER, COL_BIRTH, COL_SCORE];
pub const RECORD_HEADERS: [&str; 8] = ["일시", "학번", "이름", "구분", "점수", "사유", "요청자", "처리자"];

const HEADER_SCAN_ROWS: usize = 10;

/// Outcome of reading an import sheet. Bad rows are collected, not fatal.
#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub sheet_name: String,
    pub rows: Vec<StudentRow>,
    pub errors: Vec<String>,
}

pub(crate) fn header_format() -> Format {
    Format::new().set_bold()
}

pub(crate) fn write_header(sheet: &mut Worksheet, headers: &[&str]) -> AppResult<()> {
    let bold = header_format();
    for (col, title) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
        sheet.set_column_width(col as u16, 14)?;
    }
    Ok(())
}

pub fn export_students(students: &[Account]) -> AppResult<Vec<u8>> {
    let mut sheet = Worksheet::new();
    sheet.set_name("학생명단")?;
    write_header(&mut sheet, &STUDENT_HEADERS)?;

    for (i, student) in students.iter().enumerate() {
        let row = (i + 1) as u32;
        let data = StudentRow::from(student);
        sheet.write_string(row, 0, &data.student_code)?;
        sheet.write_string(row, 1, &data.name)?;
        sheet.write_number(row, 2, data.grade as f64)?;
        sheet.write_number(row, 3, data.class_number as f64)?;
        sheet.write_number(row, 4, data.student_number as f64)?;
        sheet.write_string(row, 5, data.birth_date.as_deref().unwrap_or_default())?;
        sheet.write_number(row, 6, student.cumulative_score as f64)?;
    }

    let mut workbook = Workbook::new();
    workbook.push_worksheet(sheet);
    Ok(workbook.save_to_buffer()?)
}

/// Timestamps are written in the school's local time.
pub fn export_records(records: &[RecordWithStudent], offset: FixedOffset) -> AppResult<Vec<u8>> {
    let mut sheet = Worksheet::new();
    sheet.set_name("상벌점기록")?;
    write_header(&mut sheet, &RECORD_HEADERS)?;
    write_record_rows(&mut sheet, records, offset)?;

    let mut workbook = Workbook::new();
    workbook.push_worksheet(sheet);
    Ok(workbook.save_to_buffer()?)
}

pub(crate) fn write_record_rows(
    sheet: &mut Worksheet,
    records: &[RecordWithStudent],
    offset: FixedOffset,
) -> AppResult<()> {
    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        let local = record.created_at.with_timezone(&offset);
        sheet.write_string(row, 0, local.format("%Y-%m-%d %H:%M").to_string())?;
        sheet.write_string(row, 1, record.student_code.as_deref().unwrap_or_default())?;
        sheet.write_string(row, 2, &record.student_name)?;
        sheet.write_string(row, 3, record.kind.label())?;
        sheet.write_number(row, 4, record.points as f64)?;
        sheet.write_string(row, 5, &record.reason)?;
        sheet.write_string(row, 6, &record.created_by_name)?;
        sheet.write_string(row, 7, record.processed_by_name.as_deref().unwrap_or_default())?;
    }
    Ok(())
}

/// Picks the roster sheet: a name mentioning 학생 or 명단, else the first sheet.
pub fn pick_sheet(names: &[String]) -> Option<&String> {
    names
        .iter()
        .find(|n| n.contains("학생") || n.contains("명단"))
        .or_else(|| names.first())
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.chars().take(10).collect(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Accepts `2009-03-14`, `2009.03.14`, `20090314` or `090314`; stores `YYYY-MM-DD`.
pub fn normalize_birth_date(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let (year, rest) = match digits.len() {
        8 => (digits[..4].parse::<i32>().ok()?, &digits[4..]),
        6 => {
            let yy = digits[..2].parse::<i32>().ok()?;
            let century = if yy <= chrono::Utc::now().year() % 100 { 2000 } else { 1900 };
            (century + yy, &digits[2..])
        }
        _ => return None,
    };
    let month = rest[..2].parse().ok()?;
    let day = rest[2..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Splits a 5-digit 학번 (GCCNN) into grade, class and number.
pub fn split_student_code(code: &str) -> Option<(i64, i64, i64)> {
    if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((
        code[..1].parse().ok()?,
        code[1..3].parse().ok()?,
        code[3..].parse().ok()?,
    ))
}

fn normalize_label(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_int(text: &str) -> Option<i64> {
    let trimmed = text.trim().trim_end_matches(|c| c == '학' || c == '년' || c == '반' || c == '번');
    trimmed.parse().ok()
}

fn parse_row(cells: &[Data], columns: &HashMap<String, usize>, sheet_row: usize) -> Result<Option<StudentRow>, String> {
    let get = |label: &str| -> String {
        columns
            .get(label)
            .and_then(|&idx| cells.get(idx))
            .map(cell_text)
            .unwrap_or_default()
    };

    let code = get(COL_CODE);
    let name = get(COL_NAME);
    if code.is_empty() && name.is_empty() {
        return Ok(None);
    }
    if code.is_empty() || name.is_empty() {
        return Err(format!("{}행: 학번과 이름은 필수입니다.", sheet_row));
    }

    let derived = split_student_code(&code);
    let pick = |label: &str, fallback: Option<i64>| -> Result<i64, String> {
        let text = get(label);
        if text.is_empty() {
            fallback.ok_or_else(|| format!("{}행: {} 값이 없습니다.", sheet_row, label))
        } else {
            parse_int(&text).ok_or_else(|| format!("{}행: {} 값 '{}'이(가) 올바르지 않습니다.", sheet_row, label, text))
        }
    };
    let grade = pick(COL_GRADE, derived.map(|d| d.0))?;
    let class_number = pick(COL_CLASS, derived.map(|d| d.1))?;
    let student_number = pick(COL_NUMBER, derived.map(|d| d.2))?;

    let birth_raw = get(COL_BIRTH);
    let birth_date = if birth_raw.is_empty() {
        None
    } else {
        Some(normalize_birth_date(&birth_raw).ok_or_else(|| {
            format!("{}행: 생년월일 '{}'을(를) 해석할 수 없습니다.", sheet_row, birth_raw)
        })?)
    };

    Ok(Some(StudentRow {
        student_code: code,
        name,
        grade,
        class_number,
        student_number,
        birth_date,
    }))
}

/// Reads a student roster workbook.
pub fn parse_student_workbook(bytes: &[u8]) -> AppResult<ParsedSheet> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec()))?;
    let names = workbook.sheet_names();
    let sheet_name = pick_sheet(&names)
        .cloned()
        .ok_or_else(|| AppError::Spreadsheet("시트가 없는 파일입니다.".to_string()))?;
    let range = workbook.worksheet_range(&sheet_name)?;
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);

    let rows: Vec<&[Data]> = range.rows().collect();
    let header_idx = rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|cells| {
            let labels: Vec<String> = cells.iter().map(|c| normalize_label(&cell_text(c))).collect();
            labels.iter().any(|l| l == COL_CODE) && labels.iter().any(|l| l == COL_NAME)
        })
        .ok_or_else(|| AppError::Spreadsheet("'학번'과 '이름' 열을 찾을 수 없습니다.".to_string()))?;

    let columns: HashMap<String, usize> = rows[header_idx]
        .iter()
        .enumerate()
        .map(|(idx, cell)| (normalize_label(&cell_text(cell)), idx))
        .filter(|(label, _)| !label.is_empty())
        .collect();

    let mut parsed = ParsedSheet {
        sheet_name,
        ..ParsedSheet::default()
    };
    for (offset, cells) in rows.iter().enumerate().skip(header_idx + 1) {
        let sheet_row = first_row + offset + 1;
        match parse_row(cells, &columns, sheet_row) {
            Ok(Some(row)) => parsed.rows.push(row),
            Ok(None) => {}
            Err(msg) => parsed.errors.push(msg),
        }
    }

    tracing::info!(
        "📄 Parsed sheet '{}': {} rows, {} errors.",
        parsed.sheet_name,
        parsed.rows.len(),
        parsed.errors.len()
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::{AccountStatus, Role};
    use chrono::Utc;

    fn account(row: &StudentRow, score: i64) -> Account {
        Account {
            id: format!("id-{}", row.student_code),
            login_id: row.student_code.clone(),
            password_hash: String::new(),
            name: row.name.clone(),
            role: Role::Student,
            status: AccountStatus::Active,
            email: None,
            subject: None,
            grade: Some(row.grade),
            class_number: Some(row.class_number),
            student_number: Some(row.student_number),
            student_code: Some(row.student_code.clone()),
            birth_date: row.birth_date.clone(),
            cumulative_score: score,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn export_then_import_reproduces_students() {
        let rows = vec![
            StudentRow {
                student_code: "10203".into(),
                name: "홍길동".into(),
                grade: 1,
                class_number: 2,
                student_number: 3,
                birth_date: Some("2009-03-14".into()),
            },
            StudentRow {
                student_code: "30112".into(),
                name: "김영희".into(),
                grade: 3,
                class_number: 1,
                student_number: 12,
                birth_date: None,
            },
        ];
        let accounts: Vec<Account> = rows.iter().map(|r| account(r, -3)).collect();

        let bytes = export_students(&accounts).unwrap();
        let parsed = parse_student_workbook(&bytes).unwrap();

        assert_eq!(parsed.sheet_name, "학생명단");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.rows, rows);
    }

    #[test]
    fn header_may_sit_below_a_title_and_missing_columns_come_from_the_code() {
        let mut sheet = Worksheet::new();
        sheet.set_name("Sheet1").unwrap();
        sheet.write_string(0, 0, "2025학년도 1학년 명렬표").unwrap();
        sheet.write_string(2, 0, "학 번").unwrap();
        sheet.write_string(2, 1, "이름").unwrap();
        sheet.write_string(2, 2, "생년월일").unwrap();
        sheet.write_number(3, 0, 10405.0).unwrap();
        sheet.write_string(3, 1, "이철수").unwrap();
        sheet.write_string(3, 2, "20090527").unwrap();
        sheet.write_string(4, 0, "10406").unwrap();
        sheet.write_string(4, 1, "박민수").unwrap();
        sheet.write_string(4, 2, "not a date").unwrap();
        let mut workbook = Workbook::new();
        workbook.push_worksheet(sheet);
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = parse_student_workbook(&bytes).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        let row = &parsed.rows[0];
        assert_eq!(row.student_code, "10405");
        assert_eq!((row.grade, row.class_number, row.student_number), (1, 4, 5));
        assert_eq!(row.birth_date.as_deref(), Some("2009-05-27"));
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].starts_with("5행"), "{}", parsed.errors[0]);
    }

    #[test]
    fn sheet_without_headers_is_rejected() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "hello").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();
        assert!(matches!(parse_student_workbook(&bytes), Err(AppError::Spreadsheet(_))));
    }

    #[test]
    fn roster_sheet_is_preferred() {
        let names = vec!["표지".to_string(), "2학년 학생".to_string()];
        assert_eq!(pick_sheet(&names).map(String::as_str), Some("2학년 학생"));
        let names = vec!["Sheet1".to_string()];
        assert_eq!(pick_sheet(&names).map(String::as_str), Some("Sheet1"));
    }

    #[test]
    fn birth_dates_normalize() {
        assert_eq!(normalize_birth_date("2009.3.14"), None);
        assert_eq!(normalize_birth_date("2009.03.14").as_deref(), Some("2009-03-14"));
        assert_eq!(normalize_birth_date("090314").as_deref(), Some("2009-03-14"));
        assert_eq!(normalize_birth_date("20091332"), None);
    }

    #[test]
    fn student_code_splits_into_grade_class_number() {
        assert_eq!(split_student_code("20315"), Some((2, 3, 15)));
        assert_eq!(split_student_code("2031"), None);
        assert_eq!(split_student_code("2a315"), None);
    }
}
