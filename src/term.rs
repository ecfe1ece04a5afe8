use yansi::Paint;

pub fn paint_green_bold(input: &str) -> String {
    Paint::green(input).bold().to_string()
}

pub fn paint_yellow_bold(input: &str) -> String {
    Paint::yellow(input).bold().to_string()
}

pub fn paint_red_bold(input: &str) -> String {
    Paint::red(input).bold().to_string()
}

/// Colors the status words of a formatted report for terminal output.
/// The text itself is left untouched.
pub fn paint_report(report: &str) -> String {
    report
        .lines()
        .map(paint_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paint_line(line: &str) -> String {
    if let Some(name) = line.strip_suffix(": PASS") {
        format!("{name}: {}", paint_green_bold("PASS"))
    } else if let Some(name) = line.strip_suffix(": FAIL") {
        format!("{name}: {}", paint_red_bold("FAIL"))
    } else if let Some(name) = line.strip_suffix(": SKIP") {
        format!("{name}: {}", paint_yellow_bold("SKIP"))
    } else if line.starts_with("ALL ") {
        paint_green_bold(line)
    } else if line.starts_with("SOME ") {
        paint_red_bold(line)
    } else {
        line.to_string()
    }
}
