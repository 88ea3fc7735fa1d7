// ==========================================
// 机加工车间排产系统 - 资源数据仓储
// ==========================================
// 设备/机组/操作工/资质/排班/请假/客户
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::resource::{
    Customer, Machine, Operator, OperatorDaySchedule, Qualification, ShiftPattern, TimeOff,
};
use crate::domain::types::MachineStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_util::{fmt_date, fmt_time, parse_date, parse_time, parse_time_opt};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// MachineRepository - 设备仓储
// ==========================================
pub struct MachineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建设备
    pub fn create(&self, machine: &Machine) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO machine (machine_id, machine_name, status, efficiency_modifier)
               VALUES (?, ?, ?, ?)"#,
            params![
                &machine.machine_id,
                &machine.machine_name,
                machine.status.to_db_str(),
                &machine.efficiency_modifier,
            ],
        )?;

        Ok(machine.machine_id.clone())
    }

    /// 按machine_id查询设备
    pub fn find_by_id(&self, machine_id: &str) -> RepositoryResult<Option<Machine>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            "SELECT machine_id, machine_name, status, efficiency_modifier
             FROM machine WHERE machine_id = ?",
            params![machine_id],
            |row| Self::map_row(row),
        ) {
            Ok(machine) => Ok(Some(machine)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部设备
    pub fn list_all(&self) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT machine_id, machine_name, status, efficiency_modifier
             FROM machine ORDER BY machine_id",
        )?;

        let machines = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<Result<Vec<Machine>, _>>()?;

        Ok(machines)
    }

    /// 将设备加入机组
    pub fn add_group_member(&self, group_code: &str, machine_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO machine_group_member (group_code, machine_id) VALUES (?, ?)",
            params![group_code, machine_id],
        )?;

        Ok(())
    }

    /// 查询机组内的全部可用设备（插入序即稳定序）
    pub fn find_active_in_group(&self, group_code: &str) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT m.machine_id, m.machine_name, m.status, m.efficiency_modifier
               FROM machine_group_member g
               JOIN machine m ON m.machine_id = g.machine_id
               WHERE g.group_code = ? AND m.status = 'ACTIVE'
               ORDER BY m.rowid"#,
        )?;

        let machines = stmt
            .query_map(params![group_code], |row| Self::map_row(row))?
            .collect::<Result<Vec<Machine>, _>>()?;

        Ok(machines)
    }

    /// 查询全部机组成员关系 (group_code, machine_id)
    pub fn list_group_memberships(&self) -> RepositoryResult<Vec<(String, String)>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT group_code, machine_id FROM machine_group_member ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Machine> {
        Ok(Machine {
            machine_id: row.get(0)?,
            machine_name: row.get(1)?,
            status: MachineStatus::from_str(&row.get::<_, String>(2)?),
            efficiency_modifier: row.get(3)?,
        })
    }
}

// ==========================================
// OperatorRepository - 操作工仓储
// ==========================================
pub struct OperatorRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OperatorRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建操作工
    pub fn create(&self, operator: &Operator) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO operator (
                operator_id, display_code, operator_name, shift_class,
                shift_pattern_code, custom_start_time, custom_end_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &operator.operator_id,
                &operator.display_code,
                &operator.operator_name,
                &operator.shift_class,
                &operator.shift_pattern_code,
                &operator.custom_start_time.map(fmt_time),
                &operator.custom_end_time.map(fmt_time),
            ],
        )?;

        Ok(operator.operator_id.clone())
    }

    /// 按operator_id查询操作工
    pub fn find_by_id(&self, operator_id: &str) -> RepositoryResult<Option<Operator>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE operator_id = ?", SELECT_OPERATOR),
            params![operator_id],
            |row| Self::map_row(row),
        ) {
            Ok(operator) => Ok(Some(operator)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部操作工
    pub fn list_all(&self) -> RepositoryResult<Vec<Operator>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!("{} ORDER BY operator_id", SELECT_OPERATOR))?;

        let operators = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<Result<Vec<Operator>, _>>()?;

        Ok(operators)
    }

    /// 写入资质 (UPSERT)
    pub fn upsert_qualification(&self, q: &Qualification) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO qualification (operator_id, machine_id, proficiency_level, preference_rank)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(operator_id, machine_id)
               DO UPDATE SET proficiency_level = ?3, preference_rank = ?4"#,
            params![
                &q.operator_id,
                &q.machine_id,
                &q.proficiency_level,
                &q.preference_rank,
            ],
        )?;

        Ok(())
    }

    /// 查询某设备的全部资质（插入序即稳定序）
    pub fn find_qualifications_for_machine(
        &self,
        machine_id: &str,
    ) -> RepositoryResult<Vec<Qualification>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT operator_id, machine_id, proficiency_level, preference_rank
               FROM qualification WHERE machine_id = ? ORDER BY rowid"#,
        )?;

        let quals = stmt
            .query_map(params![machine_id], |row| Self::map_qualification(row))?
            .collect::<Result<Vec<Qualification>, _>>()?;

        Ok(quals)
    }

    /// 查询全部资质
    pub fn list_qualifications(&self) -> RepositoryResult<Vec<Qualification>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT operator_id, machine_id, proficiency_level, preference_rank
               FROM qualification ORDER BY rowid"#,
        )?;

        let quals = stmt
            .query_map([], |row| Self::map_qualification(row))?
            .collect::<Result<Vec<Qualification>, _>>()?;

        Ok(quals)
    }

    /// 写入按周几的显式排班 (UPSERT)
    pub fn set_day_schedule(&self, entry: &OperatorDaySchedule) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO operator_day_schedule (operator_id, weekday, start_time, end_time)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(operator_id, weekday)
               DO UPDATE SET start_time = ?3, end_time = ?4"#,
            params![
                &entry.operator_id,
                &entry.weekday,
                fmt_time(entry.start_time),
                fmt_time(entry.end_time),
            ],
        )?;

        Ok(())
    }

    /// 查询全部显式排班
    pub fn list_day_schedules(&self) -> RepositoryResult<Vec<OperatorDaySchedule>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT operator_id, weekday, start_time, end_time
             FROM operator_day_schedule ORDER BY operator_id, weekday",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(OperatorDaySchedule {
                    operator_id: row.get(0)?,
                    weekday: row.get(1)?,
                    start_time: parse_time(2, &row.get::<_, String>(2)?)?,
                    end_time: parse_time(3, &row.get::<_, String>(3)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// 创建班次模板
    pub fn create_shift_pattern(&self, pattern: &ShiftPattern) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO shift_pattern (pattern_code, pattern_name, start_time, end_time, workdays)
               VALUES (?, ?, ?, ?, ?)"#,
            params![
                &pattern.pattern_code,
                &pattern.pattern_name,
                fmt_time(pattern.start_time),
                fmt_time(pattern.end_time),
                pattern.workdays_to_db(),
            ],
        )?;

        Ok(())
    }

    /// 查询全部班次模板
    pub fn list_shift_patterns(&self) -> RepositoryResult<Vec<ShiftPattern>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT pattern_code, pattern_name, start_time, end_time, workdays
             FROM shift_pattern ORDER BY pattern_code",
        )?;

        let patterns = stmt
            .query_map([], |row| {
                Ok(ShiftPattern {
                    pattern_code: row.get(0)?,
                    pattern_name: row.get(1)?,
                    start_time: parse_time(2, &row.get::<_, String>(2)?)?,
                    end_time: parse_time(3, &row.get::<_, String>(3)?)?,
                    workdays: ShiftPattern::parse_workdays(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Operator> {
        Ok(Operator {
            operator_id: row.get(0)?,
            display_code: row.get(1)?,
            operator_name: row.get(2)?,
            shift_class: row.get(3)?,
            shift_pattern_code: row.get(4)?,
            custom_start_time: parse_time_opt(5, row.get(5)?)?,
            custom_end_time: parse_time_opt(6, row.get(6)?)?,
        })
    }

    fn map_qualification(row: &rusqlite::Row) -> rusqlite::Result<Qualification> {
        Ok(Qualification {
            operator_id: row.get(0)?,
            machine_id: row.get(1)?,
            proficiency_level: row.get(2)?,
            preference_rank: row.get(3)?,
        })
    }
}

const SELECT_OPERATOR: &str = r#"SELECT operator_id, display_code, operator_name, shift_class,
       shift_pattern_code, custom_start_time, custom_end_time
  FROM operator"#;

// ==========================================
// TimeOffRepository - 请假仓储
// ==========================================
pub struct TimeOffRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TimeOffRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建请假记录
    pub fn create(&self, time_off: &TimeOff) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO time_off (
                time_off_id, operator_id, start_date, end_date, reason, approved
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &time_off.time_off_id,
                &time_off.operator_id,
                fmt_date(time_off.start_date),
                fmt_date(time_off.end_date),
                &time_off.reason,
                time_off.approved as i32,
            ],
        )?;

        Ok(time_off.time_off_id.clone())
    }

    /// 查询全部审批通过的请假记录
    pub fn list_approved(&self) -> RepositoryResult<Vec<TimeOff>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE approved = 1 ORDER BY operator_id, start_date",
            SELECT_TIME_OFF
        ))?;

        let records = stmt
            .query_map([], |row| Self::map_row(row))?
            .collect::<Result<Vec<TimeOff>, _>>()?;

        Ok(records)
    }

    /// 按time_off_id查询请假记录
    pub fn find_by_id(&self, time_off_id: &str) -> RepositoryResult<Option<TimeOff>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE time_off_id = ?", SELECT_TIME_OFF),
            params![time_off_id],
            |row| Self::map_row(row),
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询某操作工审批通过的请假记录
    pub fn find_approved_for_operator(&self, operator_id: &str) -> RepositoryResult<Vec<TimeOff>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE approved = 1 AND operator_id = ? ORDER BY start_date",
            SELECT_TIME_OFF
        ))?;

        let records = stmt
            .query_map(params![operator_id], |row| Self::map_row(row))?
            .collect::<Result<Vec<TimeOff>, _>>()?;

        Ok(records)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<TimeOff> {
        Ok(TimeOff {
            time_off_id: row.get(0)?,
            operator_id: row.get(1)?,
            start_date: parse_date(2, &row.get::<_, String>(2)?)?,
            end_date: parse_date(3, &row.get::<_, String>(3)?)?,
            reason: row.get(4)?,
            approved: row.get::<_, i32>(5)? != 0,
        })
    }
}

const SELECT_TIME_OFF: &str = r#"SELECT time_off_id, operator_id, start_date, end_date, reason, approved
  FROM time_off"#;

// ==========================================
// CustomerRepository - 客户仓储
// ==========================================
pub struct CustomerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CustomerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建客户
    pub fn create(&self, customer: &Customer) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT INTO customer (customer_id, customer_name, tier_weight) VALUES (?, ?, ?)",
            params![
                &customer.customer_id,
                &customer.customer_name,
                &customer.tier_weight,
            ],
        )?;

        Ok(customer.customer_id.clone())
    }

    /// 按customer_id查询客户
    pub fn find_by_id(&self, customer_id: &str) -> RepositoryResult<Option<Customer>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            "SELECT customer_id, customer_name, tier_weight FROM customer WHERE customer_id = ?",
            params![customer_id],
            |row| {
                Ok(Customer {
                    customer_id: row.get(0)?,
                    customer_name: row.get(1)?,
                    tier_weight: row.get(2)?,
                })
            },
        ) {
            Ok(customer) => Ok(Some(customer)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询客户分层权重；未知客户按中性档自动注册
    ///
    /// # 返回
    /// 分层权重 [0,400]，未知客户注册后返回 0
    pub fn tier_weight_or_register(&self, customer_id: &str) -> RepositoryResult<i32> {
        if let Some(customer) = self.find_by_id(customer_id)? {
            return Ok(customer.tier_weight);
        }

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO customer (customer_id, customer_name, tier_weight)
             VALUES (?, ?, 0)",
            params![customer_id, customer_id],
        )?;

        Ok(0)
    }
}
