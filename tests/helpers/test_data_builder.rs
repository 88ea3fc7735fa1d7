// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use workshop_aps::domain::job::{Job, Operation};
use workshop_aps::domain::types::{JobStatus, JobType, RoutingStatus};

// ==========================================
// Job 构建器
// ==========================================

pub struct JobBuilder {
    job_id: String,
    customer_id: String,
    job_type: JobType,
    parent_job_id: Option<String>,
    schedule_locked: bool,
    expedite_flag: bool,
    order_date: Option<NaiveDate>,
    promised_date: Option<NaiveDate>,
    created_at: NaiveDateTime,
}

impl JobBuilder {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            customer_id: "CUST-DEFAULT".to_string(),
            job_type: JobType::Standard,
            parent_job_id: None,
            schedule_locked: false,
            expedite_flag: false,
            order_date: None,
            promised_date: None,
            created_at: NaiveDate::from_ymd_opt(2025, 8, 11)
                .expect("合法日期")
                .and_hms_opt(7, 0, 0)
                .expect("合法时刻"),
        }
    }

    pub fn customer(mut self, customer_id: &str) -> Self {
        self.customer_id = customer_id.to_string();
        self
    }

    pub fn job_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    pub fn parent(mut self, parent_job_id: &str) -> Self {
        self.parent_job_id = Some(parent_job_id.to_string());
        self
    }

    pub fn locked(mut self) -> Self {
        self.schedule_locked = true;
        self
    }

    pub fn expedite(mut self) -> Self {
        self.expedite_flag = true;
        self
    }

    pub fn order_date(mut self, date: NaiveDate) -> Self {
        self.order_date = Some(date);
        self
    }

    pub fn promised_date(mut self, date: NaiveDate) -> Self {
        self.promised_date = Some(date);
        self
    }

    pub fn build(self) -> Job {
        Job {
            job_id: self.job_id.clone(),
            customer_id: self.customer_id,
            job_name: format!("工单-{}", self.job_id),
            job_type: self.job_type,
            parent_job_id: self.parent_job_id,
            assembly_sequence: None,
            status: JobStatus::Pending,
            schedule_locked: self.schedule_locked,
            expedite_flag: self.expedite_flag,
            priority_score: 0,
            priority_reason: None,
            order_date: self.order_date,
            promised_date: self.promised_date,
            due_date: self.promised_date,
            revision: 0,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

// ==========================================
// Operation 构建器
// ==========================================

pub struct OperationBuilder {
    operation_id: String,
    job_id: String,
    sequence_order: i32,
    estimated_minutes: i64,
    required_machine_id: Option<String>,
    required_group_code: Option<String>,
    operation_type: Option<String>,
    outsourced_flag: bool,
    vendor_lead_days: i64,
    inspection_flag: bool,
}

impl OperationBuilder {
    pub fn new(operation_id: &str, job_id: &str, sequence_order: i32) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            job_id: job_id.to_string(),
            sequence_order,
            estimated_minutes: 60,
            required_machine_id: None,
            required_group_code: None,
            operation_type: None,
            outsourced_flag: false,
            vendor_lead_days: 0,
            inspection_flag: false,
        }
    }

    pub fn minutes(mut self, minutes: i64) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn machine(mut self, machine_id: &str) -> Self {
        self.required_machine_id = Some(machine_id.to_string());
        self
    }

    pub fn group(mut self, group_code: &str) -> Self {
        self.required_group_code = Some(group_code.to_string());
        self
    }

    pub fn operation_type(mut self, op_type: &str) -> Self {
        self.operation_type = Some(op_type.to_string());
        self
    }

    pub fn outsourced(mut self, lead_days: i64) -> Self {
        self.outsourced_flag = true;
        self.vendor_lead_days = lead_days;
        self
    }

    pub fn inspection(mut self) -> Self {
        self.inspection_flag = true;
        self.estimated_minutes = 0;
        self
    }

    pub fn build(self) -> Operation {
        Operation {
            operation_id: self.operation_id.clone(),
            job_id: self.job_id,
            sequence_order: self.sequence_order,
            operation_name: format!("工序-{}", self.operation_id),
            operation_type: self.operation_type,
            estimated_minutes: self.estimated_minutes,
            required_machine_id: self.required_machine_id,
            required_group_code: self.required_group_code,
            outsourced_flag: self.outsourced_flag,
            vendor_lead_days: self.vendor_lead_days,
            inspection_flag: self.inspection_flag,
            routing_status: RoutingStatus::Pending,
        }
    }
}
