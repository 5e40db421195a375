pub(crate) mod host_stats;
pub(crate) mod log;
pub(crate) mod report;

use self::report::ReportFormatter;
use crate::options::ReportFormat;

pub(crate) fn get_report_formatter(format: ReportFormat) -> Box<dyn ReportFormatter> {
    match format {
        ReportFormat::Compact => Box::new(report::Compact),
        ReportFormat::Json => Box::new(report::Json),
    }
}
