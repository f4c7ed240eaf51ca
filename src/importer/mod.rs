// ==========================================
// 需求预测冲减模块 - 导入层
// ==========================================
// 职责: 外部预测数量导入，经由 set_quantity_range 写入预测；订单读取
// 支持: CSV
// ==========================================

// 模块声明
pub mod csv_importer;
pub mod error;
pub mod file_parser;
pub mod order_reader;

// 重导出核心类型
pub use csv_importer::{ForecastCsvImporter, ImportErrorPolicy, ImportReport};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, RawRecord};
pub use order_reader::read_orders;
